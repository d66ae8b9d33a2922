//! Tracker Worker: カメラベースの位置推定と位置テレメトリ送信
//!
//! サイクルごとにカメラフレームを取得し、デバイスごとの追跡を更新、
//! 共有状態テーブルへ位置を書き込み、メッセージBを送信する。
//! クライアント未接続の間は追跡維持のためデバイスのLEDを追跡色へ
//! 更新し続ける（LED設定はタイムアウトで消えるため再送が必要）。

use crate::application::rate::WorkerStats;
use crate::application::session::{SessionContext, ShutdownFlag};
use crate::application::state::DeviceStateTable;
use crate::domain::wire::format_position;
use crate::domain::{DevicePort, TrackerPort, TrackingStatus, Vec3};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// デバイスごとの追跡ローカル状態（ワーカー専有、ロック不要）
///
/// 追跡が一時的に途切れたサイクルでは最後の観測値を使い続ける。
/// クライアント側はtrackingフラグで鮮度を判断する。
#[derive(Debug, Clone, Copy, Default)]
struct TrackState {
    u: f32,
    v: f32,
    location: Vec3,
}

/// Tracker Worker本体
pub struct TrackerWorker<D: DevicePort, T: TrackerPort> {
    tracker: T,
    devices: Vec<Arc<Mutex<D>>>,
    states: Arc<DeviceStateTable>,
    session: Arc<SessionContext>,
    shutdown: ShutdownFlag,
    track_states: Vec<TrackState>,
    seq_no: u32,
    stats: WorkerStats,
}

impl<D: DevicePort, T: TrackerPort> TrackerWorker<D, T> {
    pub fn new(
        tracker: T,
        devices: Vec<Arc<Mutex<D>>>,
        states: Arc<DeviceStateTable>,
        session: Arc<SessionContext>,
        shutdown: ShutdownFlag,
        stats: WorkerStats,
    ) -> Self {
        let device_count = devices.len();
        Self {
            tracker,
            devices,
            states,
            session,
            shutdown,
            track_states: vec![TrackState::default(); device_count],
            seq_no: 0,
            stats,
        }
    }

    /// ワーカーループ（専用スレッドで実行）
    ///
    /// サイクル間のスリープは持たない。`update_frame()`がカメラの
    /// フレームレートに律速されるため、それ自体がペーシングになる。
    pub fn run(mut self) {
        info!("Tracker worker started: devices={}", self.devices.len());

        while !self.shutdown.is_set() {
            self.cycle();
        }

        info!("Tracker worker stopped");
    }

    /// 1サイクル分の処理
    pub fn cycle(&mut self) {
        if let Err(e) = self.tracker.update_frame() {
            warn!("Frame update failed: {}", e);
            return;
        }

        let okay_to_send = self.session.okay_to_send();
        let (frame_w, frame_h) = self.tracker.frame_size();

        for device_id in 0..self.devices.len() {
            if let Err(e) = self.tracker.update_device(device_id) {
                warn!("Tracking update failed: device={}, {}", device_id, e);
                continue;
            }

            let tracking = self.tracker.status(device_id) == TrackingStatus::Tracking;
            if tracking {
                match (
                    self.tracker.image_position(device_id),
                    self.tracker.location(device_id),
                ) {
                    (Ok(image), Ok(location)) => {
                        self.track_states[device_id] = TrackState {
                            u: image.u / frame_w as f32,
                            v: image.v / frame_h as f32,
                            location,
                        };
                    }
                    (Err(e), _) | (_, Err(e)) => {
                        warn!("Position read failed: device={}, {}", device_id, e);
                    }
                }
            }

            let track = self.track_states[device_id];
            self.states.update_position(device_id, track.location);

            if okay_to_send {
                let message = format_position(
                    self.seq_no,
                    device_id,
                    track.location,
                    track.u,
                    track.v,
                    tracking,
                );
                if let Err(e) = self.session.send_to_client(&message) {
                    debug!("Telemetry send failed: device={}, {}", device_id, e);
                }
                self.stats.record_emitted();
            } else {
                self.stats.record_skipped();
                self.refresh_device_led(device_id);
            }
        }

        if okay_to_send {
            self.seq_no = self.seq_no.wrapping_add(1);
        }

        let tracker = &mut self.tracker;
        if let Err(e) = self.session.offer_debug_frame(|| tracker.annotate()) {
            warn!("Debug frame render failed: {}", e);
        }

        self.stats.record_cycle();
        if self.stats.should_report() {
            self.stats.report("tracker");
        }
    }

    /// 追跡色をデバイスのLEDへ再送する（クライアント未接続時のみ）
    fn refresh_device_led(&mut self, device_id: usize) {
        let color = match self.tracker.color(device_id) {
            Ok(color) => color,
            Err(e) => {
                debug!("Tracker color unavailable: device={}, {}", device_id, e);
                return;
            }
        };
        let mut device = self.devices[device_id].lock().expect("device lock poisoned");
        if let Err(e) = device.set_leds(color) {
            warn!("LED refresh failed: device={}, {}", device_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ConnectionType, DebugFrame, DomainResult, ImagePosition, RgbColor, SensorSample,
    };
    use std::time::Duration;

    struct FakeDevice {
        leds: Vec<RgbColor>,
    }

    impl DevicePort for FakeDevice {
        fn poll(&mut self) -> bool {
            false
        }
        fn read_sample(&mut self) -> DomainResult<SensorSample> {
            Ok(SensorSample::default())
        }
        fn set_leds(&mut self, color: RgbColor) -> DomainResult<()> {
            self.leds.push(color);
            Ok(())
        }
        fn set_rumble(&mut self, _level: u8) -> DomainResult<()> {
            Ok(())
        }
        fn reset_orientation(&mut self) -> DomainResult<()> {
            Ok(())
        }
        fn connection_type(&self) -> ConnectionType {
            ConnectionType::Bluetooth
        }
    }

    /// サイクルごとに追跡状態をスクリプトで切り替えるフェイク
    struct FakeTracker {
        statuses: Vec<TrackingStatus>,
        cycle: usize,
        location: Vec3,
    }

    impl TrackerPort for FakeTracker {
        fn update_frame(&mut self) -> DomainResult<()> {
            Ok(())
        }
        fn update_device(&mut self, _device_id: usize) -> DomainResult<()> {
            Ok(())
        }
        fn status(&self, _device_id: usize) -> TrackingStatus {
            self.statuses[self.cycle.min(self.statuses.len() - 1)]
        }
        fn image_position(&self, _device_id: usize) -> DomainResult<ImagePosition> {
            Ok(ImagePosition {
                u: 320.0,
                v: 120.0,
                radius: 10.0,
            })
        }
        fn location(&self, _device_id: usize) -> DomainResult<Vec3> {
            Ok(self.location)
        }
        fn color(&self, _device_id: usize) -> DomainResult<RgbColor> {
            Ok(RgbColor::new(0, 255, 255))
        }
        fn annotate(&mut self) -> DomainResult<DebugFrame> {
            Ok(DebugFrame {
                width: 2,
                height: 2,
                data: vec![0; 12],
            })
        }
        fn frame_size(&self) -> (u32, u32) {
            (640, 480)
        }
    }

    fn make_worker(
        statuses: Vec<TrackingStatus>,
    ) -> (TrackerWorker<FakeDevice, FakeTracker>, Arc<DeviceStateTable>) {
        let tracker = FakeTracker {
            statuses,
            cycle: 0,
            location: Vec3::new(10.0, 20.0, 30.0),
        };
        let devices = vec![Arc::new(Mutex::new(FakeDevice { leds: Vec::new() }))];
        let states = Arc::new(DeviceStateTable::new(1));
        let session = Arc::new(SessionContext::new());
        let worker = TrackerWorker::new(
            tracker,
            devices,
            Arc::clone(&states),
            session,
            ShutdownFlag::new(),
            WorkerStats::new(Duration::from_secs(3600)),
        );
        (worker, states)
    }

    #[test]
    fn test_position_written_to_state_table() {
        let (mut worker, states) = make_worker(vec![TrackingStatus::Tracking]);
        worker.cycle();

        let state = states.snapshot(0);
        assert_eq!(state.position, Vec3::new(10.0, 20.0, 30.0));
    }

    #[test]
    fn test_stale_position_carryover() {
        let (mut worker, states) =
            make_worker(vec![TrackingStatus::Tracking, TrackingStatus::NotTracking]);

        worker.cycle();
        worker.tracker.cycle = 1;
        worker.tracker.location = Vec3::new(99.0, 99.0, 99.0);
        worker.cycle();

        // 追跡が途切れたサイクルでは最後の観測値を保持する
        let state = states.snapshot(0);
        assert_eq!(state.position, Vec3::new(10.0, 20.0, 30.0));
    }

    #[test]
    fn test_image_position_normalized() {
        let (mut worker, _) = make_worker(vec![TrackingStatus::Tracking]);
        worker.cycle();

        let track = worker.track_states[0];
        assert_eq!(track.u, 0.5);
        assert_eq!(track.v, 0.25);
    }

    #[test]
    fn test_led_refresh_before_connection() {
        let (mut worker, _) = make_worker(vec![TrackingStatus::Tracking]);
        worker.cycle();
        worker.cycle();

        // クライアント未接続の間は毎サイクル追跡色を再送する
        let device = worker.devices[0].lock().unwrap();
        assert_eq!(device.leds.len(), 2);
        assert_eq!(device.leds[0], RgbColor::new(0, 255, 255));
    }
}
