//! Application層: ワーカーとユースケースの統括
//!
//! Domain層のポートへ依存し、注入された実装でワーカーパイプラインを
//! 構成する。共有テーブル・セッション状態の所有者でもある。

pub mod bridge;
pub mod capture;
pub mod command;
pub mod engine;
pub mod rate;
pub mod session;
pub mod state;
pub mod tracker;

pub use engine::{ConsoleCommand, ServerRunner};
pub use session::{SessionContext, ShutdownFlag};
pub use state::{CommandTable, DeviceStateTable};
