//! Infrastructure層: ポートの具体実装と入出力
//!
//! 実機のドライバ・トラッカーSDKへのバインディングは本リポジトリの
//! 外にあるため、ここではモック実装とコンソール入力を提供する。
//! 実機実装はDevicePort/TrackerPort/PoseReporterPortを実装して
//! main.rsでの組み立てを差し替えるだけでよい。

pub mod console;
pub mod mock_bridge;
pub mod mock_device;
pub mod mock_tracker;
