//! Capture Worker: デバイスのポーリングと物理テレメトリ送信
//!
//! サイクルごとにデバイスをポーリングし、保留コマンドの消費、
//! 共有状態テーブルの更新、メッセージAの送信を行う。
//! デバイスはTracker Workerと共有するため`Arc<Mutex<_>>`越しに扱う。

use crate::application::rate::WorkerStats;
use crate::application::session::{SessionContext, ShutdownFlag};
use crate::application::state::{CommandEntry, CommandTable, DeviceStateTable, RUMBLE_IDLE};
use crate::domain::wire::format_physical;
use crate::domain::{CaptureConfig, DevicePort, DomainResult};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// トリガー生値（0-255）を共有状態の[0,1]へ正規化する
#[inline]
pub fn normalize_trigger(raw: u8) -> f32 {
    f32::from(raw) / 255.0
}

/// 保留コマンドを1デバイス分消費する
///
/// コマンドテーブルのロックを保持したまま呼び出される。デバイスI/Oを
/// ロック下で行うのは意図的で、消費と要求フラグのクリアを不可分にする。
///
/// - trackerLight要求はchangeLight要求も同時に消費する
///   （追跡色への復帰が手動色変更より優先される）
/// - 振動は有効ティック数の初回にレベルを設定し、0到達時に一度だけ
///   停止コマンドを発行してアイドル番兵値へ移る
pub fn apply_pending_commands<D: DevicePort + ?Sized>(
    entry: &mut CommandEntry,
    device: &mut D,
    rumble_activation_ticks: i32,
    tracker_enabled: bool,
) -> DomainResult<()> {
    if entry.tracker_light_requested {
        if tracker_enabled {
            device.set_leds(entry.tracked_color)?;
            entry.color = entry.tracked_color;
        }
        entry.tracker_light_requested = false;
        entry.light_change_requested = false;
    } else if entry.light_change_requested {
        device.set_leds(entry.color)?;
        entry.light_change_requested = false;
    }

    if entry.reset_orientation_requested {
        device.reset_orientation()?;
        entry.reset_orientation_requested = false;
    }

    if entry.rumble_ticks_remaining > 0 {
        if entry.rumble_ticks_remaining == rumble_activation_ticks {
            device.set_rumble(entry.rumble_level)?;
        }
        entry.rumble_ticks_remaining -= 1;
        if entry.rumble_ticks_remaining == 0 {
            device.set_rumble(0)?;
            entry.rumble_ticks_remaining = RUMBLE_IDLE;
        }
    }

    Ok(())
}

/// Capture Worker本体
pub struct CaptureWorker<D: DevicePort> {
    devices: Vec<Arc<Mutex<D>>>,
    states: Arc<DeviceStateTable>,
    commands: Arc<CommandTable>,
    session: Arc<SessionContext>,
    shutdown: ShutdownFlag,
    config: CaptureConfig,
    tracker_enabled: bool,
    msg_no: u32,
    stats: WorkerStats,
}

impl<D: DevicePort> CaptureWorker<D> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        devices: Vec<Arc<Mutex<D>>>,
        states: Arc<DeviceStateTable>,
        commands: Arc<CommandTable>,
        session: Arc<SessionContext>,
        shutdown: ShutdownFlag,
        config: CaptureConfig,
        tracker_enabled: bool,
        stats: WorkerStats,
    ) -> Self {
        Self {
            devices,
            states,
            commands,
            session,
            shutdown,
            config,
            tracker_enabled,
            msg_no: 0,
            stats,
        }
    }

    /// ワーカーループ（専用スレッドで実行）
    pub fn run(mut self) {
        info!(
            "Capture worker started: devices={}, interval={}ms",
            self.devices.len(),
            self.config.poll_interval_ms
        );

        while !self.shutdown.is_set() {
            self.cycle();
            std::thread::sleep(self.config.poll_interval());
        }

        info!("Capture worker stopped");
    }

    /// 1サイクル分の処理
    ///
    /// デバイスごとに: ポーリング→コマンド消費→状態更新→送信。
    /// サンプルのないデバイスはこのサイクルではスキップする。
    pub fn cycle(&mut self) {
        let okay_to_send = self.session.okay_to_send();

        for (device_id, shared) in self.devices.iter().enumerate() {
            let mut device = shared.lock().expect("device lock poisoned");
            if !device.poll() {
                continue;
            }

            {
                let mut entries = self.commands.lock();
                if let Err(e) = apply_pending_commands(
                    &mut entries[device_id],
                    &mut *device,
                    self.config.rumble_ticks as i32,
                    self.tracker_enabled,
                ) {
                    warn!("Command consumption failed: device={}, {}", device_id, e);
                }
            }

            let sample = match device.read_sample() {
                Ok(sample) => sample,
                Err(e) => {
                    warn!("Sample read failed: device={}, {}", device_id, e);
                    continue;
                }
            };
            drop(device);

            self.states.update_motion(
                device_id,
                sample.buttons,
                normalize_trigger(sample.trigger),
                sample.orientation.unwrap_or_default(),
            );

            if okay_to_send {
                let color = self
                    .commands
                    .snapshot(device_id)
                    .map(|entry| entry.color)
                    .unwrap_or_default();
                let message = format_physical(self.msg_no, device_id, &sample, color);
                if let Err(e) = self.session.send_to_client(&message) {
                    debug!("Telemetry send failed: device={}, {}", device_id, e);
                }
                self.stats.record_emitted();
            } else {
                self.stats.record_skipped();
            }
        }

        // メッセージ番号はデバイス単位ではなくサイクル単位で進む
        if okay_to_send {
            self.msg_no = self.msg_no.wrapping_add(1);
        }

        self.stats.record_cycle();
        if self.stats.should_report() {
            self.stats.report("capture");
        }
    }
}
