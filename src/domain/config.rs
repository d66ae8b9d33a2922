//! 設定管理
//!
//! TOML設定ファイルの読み込みとDomain型への変換。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::domain::{DomainError, DomainResult};

/// アプリケーション設定のルート構造
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AppConfig {
    /// ネットワーク設定
    pub network: NetworkConfig,
    /// デバイス設定
    #[serde(default)]
    pub device: DeviceConfig,
    /// キャプチャワーカー設定
    pub capture: CaptureConfig,
    /// トラッカーワーカー設定
    pub tracker: TrackerConfig,
    /// セカンダリプロトコルブリッジ設定
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// パイプライン設定
    pub pipeline: PipelineConfig,
}

/// ネットワーク設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NetworkConfig {
    /// 受信側のバインドアドレス
    ///
    /// デフォルト: "0.0.0.0"（全インターフェース）
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// コマンド受信ポート
    ///
    /// デフォルト: 23460
    pub recv_port: u16,

    /// テレメトリ送信ポート（ハンドシェイクで観測したクライアントアドレス宛）
    ///
    /// デフォルト: 23459
    pub send_port: u16,

    /// 受信タイムアウト（ミリ秒）
    ///
    /// Command Workerがキャンセルフラグを確認できるよう、受信は
    /// このタイムアウトで区切られます。デフォルト: 250ms
    pub recv_timeout_ms: u64,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

impl NetworkConfig {
    /// 歴史的に固定されたポート番号
    pub const DEFAULT_RECV_PORT: u16 = 23460;
    pub const DEFAULT_SEND_PORT: u16 = 23459;
    /// デフォルトの受信タイムアウト（ミリ秒）
    pub const DEFAULT_RECV_TIMEOUT_MS: u64 = 250;

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            recv_port: Self::DEFAULT_RECV_PORT,
            send_port: Self::DEFAULT_SEND_PORT,
            recv_timeout_ms: Self::DEFAULT_RECV_TIMEOUT_MS,
        }
    }
}

/// デバイス設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeviceConfig {
    /// 接続するデバイス数
    ///
    /// 実機ドライバは起動時の列挙で台数を決めますが、モック構成では
    /// ここで指定した台数を生成します。デフォルト: 1
    #[serde(default = "DeviceConfig::default_count")]
    pub count: usize,
}

impl DeviceConfig {
    pub const DEFAULT_COUNT: usize = 1;

    fn default_count() -> usize {
        Self::DEFAULT_COUNT
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            count: Self::DEFAULT_COUNT,
        }
    }
}

/// キャプチャワーカー設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CaptureConfig {
    /// サイクル間のスリープ（ミリ秒）
    ///
    /// デバイスのポーリングレートと送信帯域の上限を決めます。
    /// デフォルト: 10ms
    pub poll_interval_ms: u64,

    /// 振動コマンドの有効サイクル数
    ///
    /// クライアントはこのティック数ごとにパケットを再送して振動を
    /// 継続させます。タイムアウトで自動的に停止し、電池の浪費を防ぎます。
    /// デフォルト: 150
    pub rumble_ticks: u32,
}

impl CaptureConfig {
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;
    pub const DEFAULT_RUMBLE_TICKS: u32 = 150;

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: Self::DEFAULT_POLL_INTERVAL_MS,
            rumble_ticks: Self::DEFAULT_RUMBLE_TICKS,
        }
    }
}

/// トラッカーワーカー設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TrackerConfig {
    /// トラッカーの初期化を試みるか
    ///
    /// falseの場合、またはトラッカーの初期化に失敗した場合は
    /// 縮退モードで起動し、位置テレメトリは送信されません。
    pub enabled: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// セカンダリプロトコルブリッジ設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BridgeConfig {
    /// ブリッジワーカーを起動するか
    ///
    /// デフォルト: false
    #[serde(default)]
    pub enabled: bool,

    /// ブリッジの配信周期（ミリ秒）
    ///
    /// Capture/Trackerのサイクルとは独立。デフォルト: 10ms
    #[serde(default = "BridgeConfig::default_interval_ms")]
    pub interval_ms: u64,
}

impl BridgeConfig {
    pub const DEFAULT_INTERVAL_MS: u64 = 10;

    fn default_interval_ms() -> u64 {
        Self::DEFAULT_INTERVAL_MS
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: Self::DEFAULT_INTERVAL_MS,
        }
    }
}

/// パイプライン設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    /// 統計情報の出力間隔（秒）
    pub stats_interval_sec: u64,
}

impl PipelineConfig {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_sec)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stats_interval_sec: 10,
        }
    }
}

impl AppConfig {
    /// TOMLファイルから設定を読み込む
    pub fn from_file<P: AsRef<Path>>(path: P) -> DomainResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DomainError::Configuration(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content)
            .map_err(|e| DomainError::Configuration(format!("Failed to parse config file: {}", e)))
    }

    /// デフォルト設定をTOMLファイルに書き出す
    pub fn write_default<P: AsRef<Path>>(path: P) -> DomainResult<()> {
        let config = Self::default();
        let content = toml::to_string_pretty(&config).map_err(|e| {
            DomainError::Configuration(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, content)
            .map_err(|e| DomainError::Configuration(format!("Failed to write config file: {}", e)))
    }

    /// 設定の妥当性を検証
    pub fn validate(&self) -> DomainResult<()> {
        if self.device.count == 0 {
            return Err(DomainError::Configuration(
                "device count must be greater than 0".to_string(),
            ));
        }
        if self.network.recv_port == self.network.send_port {
            return Err(DomainError::Configuration(
                "recv_port and send_port must differ".to_string(),
            ));
        }
        if self.network.recv_timeout_ms == 0 {
            return Err(DomainError::Configuration(
                "recv_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.capture.poll_interval_ms == 0 {
            return Err(DomainError::Configuration(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.capture.rumble_ticks == 0 {
            return Err(DomainError::Configuration(
                "rumble_ticks must be greater than 0".to_string(),
            ));
        }
        if self.bridge.enabled && self.bridge.interval_ms == 0 {
            return Err(DomainError::Configuration(
                "bridge interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
