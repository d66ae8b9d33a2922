//! モックポーズレポータ実装
//!
//! セカンダリプロトコルのサーバーなしでブリッジワーカーを動かすための
//! PoseReporterPort実装。受け取った値をデバッグログへ流すだけ。

use crate::domain::{DomainResult, PoseReporterPort};
use tracing::debug;

/// モックポーズレポータ
#[derive(Default)]
pub struct MockPoseReporter {
    dispatches: u64,
}

impl MockPoseReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch_count(&self) -> u64 {
        self.dispatches
    }
}

impl PoseReporterPort for MockPoseReporter {
    fn report_buttons(&mut self, device_id: usize, pressed: &[bool]) -> DomainResult<()> {
        debug!("Bridge buttons: device={}, pressed={:?}", device_id, pressed);
        Ok(())
    }

    fn report_analog(&mut self, device_id: usize, value: f64) -> DomainResult<()> {
        debug!("Bridge analog: device={}, value={:.3}", device_id, value);
        Ok(())
    }

    fn report_pose(
        &mut self,
        device_id: usize,
        position: [f64; 3],
        quat: [f64; 4],
    ) -> DomainResult<()> {
        debug!(
            "Bridge pose: device={}, position={:?}, quat={:?}",
            device_id, position, quat
        );
        Ok(())
    }

    fn dispatch(&mut self) -> DomainResult<()> {
        self.dispatches += 1;
        Ok(())
    }
}
