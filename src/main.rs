mod application;
mod domain;
mod infrastructure;
mod logging;

use crate::application::engine::ServerRunner;
use crate::domain::config::AppConfig;
use crate::domain::error::{DomainError, DomainResult};
use crate::infrastructure::console::spawn_console_reader;
use crate::infrastructure::mock_bridge::MockPoseReporter;
use crate::infrastructure::mock_device::MockDevice;
use crate::infrastructure::mock_tracker::MockTracker;
use crate::logging::init_logging;
use std::path::PathBuf;
use std::process::ExitCode;

/// ソケット確保失敗の終了コード
///
/// ポート競合（別インスタンスの起動等）を起動スクリプト側で
/// 区別できるよう、一般エラーとは別の値にする。
const EXIT_SOCKET_SETUP: u8 = 2;

fn main() -> ExitCode {
    // ログシステムの初期化（非同期ファイル出力）
    let log_dir = PathBuf::from("logs");
    let _guard = init_logging("info", false, Some(log_dir));
    // 注意: _guardはmain終了まで保持する必要がある（Dropでログスレッドが終了）

    tracing::info!("MoveRelay starting...");

    match run() {
        Ok(_) => {
            tracing::info!("MoveRelay terminated gracefully.");
            ExitCode::SUCCESS
        }
        Err(DomainError::SocketSetup(e)) => {
            tracing::error!("Socket setup failed (is another instance running?): {}", e);
            ExitCode::from(EXIT_SOCKET_SETUP)
        }
        Err(e) => {
            tracing::error!("Fatal error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

/// アプリケーションのメイン処理
fn run() -> DomainResult<()> {
    // 設定ファイルの読み込み（存在しない場合はデフォルト設定を使用）
    let config = match AppConfig::from_file("config.toml") {
        Ok(config) => {
            tracing::info!("Loaded configuration from config.toml");
            config
        }
        Err(e) => {
            tracing::warn!("Failed to load config.toml: {:?}, using defaults", e);
            AppConfig::default()
        }
    };

    // 設定の検証
    config.validate()?;

    tracing::info!(
        "Network: recv={}:{}, send_port={}",
        config.network.bind_address,
        config.network.recv_port,
        config.network.send_port
    );
    tracing::info!(
        "Capture: interval={}ms, rumble_ticks={}",
        config.capture.poll_interval_ms,
        config.capture.rumble_ticks
    );

    // モックデバイスの初期化（実機ドライバは未接続）
    tracing::info!("Initializing {} mock device(s)...", config.device.count);
    let devices: Vec<MockDevice> = (0..config.device.count).map(|_| MockDevice::new()).collect();

    // モックトラッカーの初期化（設定で無効化されていれば縮退モード）
    let tracker = if config.tracker.enabled {
        tracing::info!("Initializing mock tracker...");
        Some(MockTracker::new(config.device.count))
    } else {
        None
    };

    // ブリッジレポータの初期化（設定で有効化されている場合のみ）
    let reporter = if config.bridge.enabled {
        tracing::info!("Initializing mock pose reporter...");
        Some(MockPoseReporter::new())
    } else {
        None
    };

    // コンソールコマンドの受け付けを開始
    let console = spawn_console_reader();
    tracing::info!("Console commands: show-debug, hide-debug, calibrate <id>, exit");

    // サーバーの起動（ブロッキング）
    let runner = ServerRunner::new(config, devices, tracker, reporter);
    runner.run(console)
}
