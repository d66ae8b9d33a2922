/// エラー型定義
///
/// Domain層の統一エラー型。thiserrorを使用して型安全なエラー処理を提供します。
///
/// # 設計方針
/// - unwrap()の使用を禁止し、明示的なエラーハンドリングを強制
/// - Result型でエラー伝播を明示化
/// - 起動時に致命的なエラー（ソケット確保失敗等）と、ワーカー内で局所回復する
///   エラー（ポーリング失敗、不正データグラム等）を型で区別

use thiserror::Error;

/// Domain層の統一エラー型
#[derive(Error, Debug)]
pub enum DomainError {
    /// デバイスドライバ関連のエラー
    #[error("Device error: {0}")]
    Device(String),

    /// トラッカー（視覚位置推定）関連のエラー
    #[error("Tracker error: {0}")]
    Tracker(String),

    /// ソケットの確保・接続に失敗（起動時に致命的）
    #[error("Socket setup failed: {0}")]
    SocketSetup(String),

    /// 定常状態での受信エラー（Command Workerのみ終了する）
    #[error("Receive error: {0}")]
    Receive(String),

    /// 送信エラー
    #[error("Send error: {0}")]
    Send(String),

    /// データグラムの解析失敗（黙って破棄される）
    #[error("Malformed datagram: {0}")]
    MalformedDatagram(String),

    /// 設定関連のエラー
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// セカンダリプロトコルブリッジのエラー
    #[error("Bridge error: {0}")]
    Bridge(String),

    /// その他のエラー
    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Domain層の統一Result型
pub type DomainResult<T> = Result<T, DomainError>;
