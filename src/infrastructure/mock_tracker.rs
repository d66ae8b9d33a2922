//! モックトラッカー実装
//!
//! カメラなしで位置テレメトリ経路を動かすためのTrackerPort実装。
//! デバイスごとに固定パレットから追跡色を割り当て、決定的な軌道を返す。

use crate::domain::{
    DebugFrame, DomainError, DomainResult, ImagePosition, RgbColor, TrackerPort, TrackingStatus,
    Vec3,
};

const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;

/// 追跡色のパレット（実トラッカーの割り当て順を模倣）
const COLOR_PALETTE: [RgbColor; 5] = [
    RgbColor { r: 255, g: 0, b: 255 },
    RgbColor { r: 0, g: 255, b: 255 },
    RgbColor { r: 255, g: 255, b: 0 },
    RgbColor { r: 255, g: 0, b: 0 },
    RgbColor { r: 0, g: 0, b: 255 },
];

/// モックトラッカー
pub struct MockTracker {
    device_count: usize,
    frame_no: u64,
}

impl MockTracker {
    pub fn new(device_count: usize) -> Self {
        Self {
            device_count,
            frame_no: 0,
        }
    }

    fn check_id(&self, device_id: usize) -> DomainResult<()> {
        if device_id < self.device_count {
            Ok(())
        } else {
            Err(DomainError::Tracker(format!(
                "unknown device id: {}",
                device_id
            )))
        }
    }
}

impl TrackerPort for MockTracker {
    fn update_frame(&mut self) -> DomainResult<()> {
        self.frame_no += 1;
        // 実カメラのフレームレート相当の待ち時間
        std::thread::sleep(std::time::Duration::from_millis(5));
        Ok(())
    }

    fn update_device(&mut self, device_id: usize) -> DomainResult<()> {
        self.check_id(device_id)
    }

    fn status(&self, _device_id: usize) -> TrackingStatus {
        TrackingStatus::Tracking
    }

    fn image_position(&self, device_id: usize) -> DomainResult<ImagePosition> {
        self.check_id(device_id)?;
        // デバイスごとに画面を分割した決定的な位置
        let offset = device_id as f32 * 60.0;
        Ok(ImagePosition {
            u: 160.0 + offset,
            v: 120.0 + offset,
            radius: 12.0,
        })
    }

    fn location(&self, device_id: usize) -> DomainResult<Vec3> {
        self.check_id(device_id)?;
        let drift = (self.frame_no % 100) as f32 * 0.1;
        Ok(Vec3::new(device_id as f32 * 10.0, 20.0 + drift, 50.0))
    }

    fn color(&self, device_id: usize) -> DomainResult<RgbColor> {
        self.check_id(device_id)?;
        Ok(COLOR_PALETTE[device_id % COLOR_PALETTE.len()])
    }

    fn annotate(&mut self) -> DomainResult<DebugFrame> {
        Ok(DebugFrame {
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            data: vec![0; (FRAME_WIDTH * FRAME_HEIGHT * 3) as usize],
        })
    }

    fn frame_size(&self) -> (u32, u32) {
        (FRAME_WIDTH, FRAME_HEIGHT)
    }
}
