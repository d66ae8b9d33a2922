//! MoveRelay - Library
//!
//! このライブラリは、バイナリターゲット（schema生成など）と統合テストで
//! プロジェクトのモジュールにアクセスするために提供されています。

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod logging;
