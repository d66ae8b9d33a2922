//! Protocol Adapter Worker: セカンダリプロトコルへの再配信
//!
//! 共有状態テーブルのスナップショットを固定周期で読み出し、
//! 注入されたレポータへボタン・トリガー・ポーズを転送する。
//! UDPテレメトリ経路とは独立に動き、クライアント接続の有無に
//! かかわらず配信を続ける。

use crate::application::session::ShutdownFlag;
use crate::application::state::DeviceStateTable;
use crate::domain::{buttons, BridgeConfig, DeviceState, DomainResult, PoseReporterPort};
use std::sync::Arc;
use tracing::{info, warn};

/// 位置のスケール係数
///
/// トラッカーの位置推定はセンチメートル単位、レポータ側の慣習は
/// メートル単位のため変換する。
const POSITION_SCALE: f64 = 0.01;

/// レポータへ展開するボタンマスクの順序（チャンネル番号に対応）
const BUTTON_CHANNELS: [u32; 9] = [
    buttons::TRIANGLE,
    buttons::CIRCLE,
    buttons::CROSS,
    buttons::SQUARE,
    buttons::SELECT,
    buttons::START,
    buttons::PS,
    buttons::MOVE,
    buttons::TRIGGER,
];

/// Protocol Adapter Worker本体
pub struct BridgeWorker<R: PoseReporterPort> {
    reporter: R,
    states: Arc<DeviceStateTable>,
    shutdown: ShutdownFlag,
    config: BridgeConfig,
}

impl<R: PoseReporterPort> BridgeWorker<R> {
    pub fn new(
        reporter: R,
        states: Arc<DeviceStateTable>,
        shutdown: ShutdownFlag,
        config: BridgeConfig,
    ) -> Self {
        Self {
            reporter,
            states,
            shutdown,
            config,
        }
    }

    /// ワーカーループ（専用スレッドで実行）
    pub fn run(mut self) {
        info!(
            "Bridge worker started: devices={}, interval={}ms",
            self.states.device_count(),
            self.config.interval_ms
        );

        while !self.shutdown.is_set() {
            if let Err(e) = self.cycle() {
                warn!("Bridge cycle failed: {}", e);
            }
            std::thread::sleep(self.config.interval());
        }

        info!("Bridge worker stopped");
    }

    /// 1サイクル分の処理
    pub fn cycle(&mut self) -> DomainResult<()> {
        for device_id in 0..self.states.device_count() {
            let state = self.states.snapshot(device_id);
            self.report_device(device_id, &state)?;
        }
        self.reporter.dispatch()
    }

    fn report_device(&mut self, device_id: usize, state: &DeviceState) -> DomainResult<()> {
        let pressed: Vec<bool> = BUTTON_CHANNELS
            .iter()
            .map(|mask| state.buttons & mask != 0)
            .collect();
        self.reporter.report_buttons(device_id, &pressed)?;
        self.reporter
            .report_analog(device_id, f64::from(state.trigger))?;

        let position = [
            f64::from(state.position.x) * POSITION_SCALE,
            f64::from(state.position.y) * POSITION_SCALE,
            f64::from(state.position.z) * POSITION_SCALE,
        ];
        // レポータ側の慣習はx, y, z, wの順
        let quat = [
            f64::from(state.orientation.x),
            f64::from(state.orientation.y),
            f64::from(state.orientation.z),
            f64::from(state.orientation.w),
        ];
        self.reporter.report_pose(device_id, position, quat)
    }
}
