//! モックデバイス実装
//!
//! 実機ドライバなしでパイプライン全体を動かすためのDevicePort実装。
//! サンプルは共有セル経由で外部から差し替えられ、発行されたコマンドは
//! ログに記録される（統合テストでの検証用）。

use crate::domain::{ConnectionType, DevicePort, DomainResult, RgbColor, SensorSample, Vec3};
use std::sync::{Arc, Mutex};

/// デバイスへ発行されたコマンドの記録
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceCommand {
    Leds(RgbColor),
    Rumble(u8),
    ResetOrientation,
}

/// モックデバイス
pub struct MockDevice {
    sample: Arc<Mutex<SensorSample>>,
    log: Arc<Mutex<Vec<DeviceCommand>>>,
    connection: ConnectionType,
    synthesize: bool,
    tick: u32,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            sample: Arc::new(Mutex::new(SensorSample::default())),
            log: Arc::new(Mutex::new(Vec::new())),
            connection: ConnectionType::Bluetooth,
            synthesize: true,
            tick: 0,
        }
    }

    /// 固定サンプルを返すモック（合成モーション無効）
    pub fn with_sample(sample: SensorSample) -> Self {
        let mock = Self::new();
        *mock.sample.lock().expect("mock sample lock poisoned") = sample;
        Self {
            synthesize: false,
            ..mock
        }
    }

    pub fn with_connection(mut self, connection: ConnectionType) -> Self {
        self.connection = connection;
        self
    }

    /// サンプルセルの共有ハンドル（テストから差し替える）
    pub fn sample_handle(&self) -> Arc<Mutex<SensorSample>> {
        Arc::clone(&self.sample)
    }

    /// コマンドログの共有ハンドル（テストから検証する）
    pub fn command_log(&self) -> Arc<Mutex<Vec<DeviceCommand>>> {
        Arc::clone(&self.log)
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DevicePort for MockDevice {
    fn poll(&mut self) -> bool {
        true
    }

    fn read_sample(&mut self) -> DomainResult<SensorSample> {
        let mut sample = *self.sample.lock().expect("mock sample lock poisoned");
        if self.synthesize {
            // ゆっくり変化する合成モーション（手動確認用）
            self.tick = self.tick.wrapping_add(1);
            let t = self.tick as f32 * 0.01;
            sample.accel = Vec3::new(t.sin(), t.cos(), 1.0);
            sample.gyro = Vec3::new(0.0, t.sin() * 0.1, 0.0);
        }
        Ok(sample)
    }

    fn set_leds(&mut self, color: RgbColor) -> DomainResult<()> {
        self.log
            .lock()
            .expect("mock log lock poisoned")
            .push(DeviceCommand::Leds(color));
        Ok(())
    }

    fn set_rumble(&mut self, level: u8) -> DomainResult<()> {
        self.log
            .lock()
            .expect("mock log lock poisoned")
            .push(DeviceCommand::Rumble(level));
        Ok(())
    }

    fn reset_orientation(&mut self) -> DomainResult<()> {
        self.log
            .lock()
            .expect("mock log lock poisoned")
            .push(DeviceCommand::ResetOrientation);
        Ok(())
    }

    fn connection_type(&self) -> ConnectionType {
        self.connection
    }
}
