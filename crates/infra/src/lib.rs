//! # Alert Relay インフラ層
//!
//! ブローカー（Redis）とメール転送（SMTP）との接続・通信を担当する。
//!
//! ## 設計方針
//!
//! 外部システムへのアクセスは trait で抽象化し、アプリ層はこの trait だけに依存する。
//! テストではインメモリのモック（[`mock`]、`test-utils` feature）に差し替える。
//!
//! | trait | 本番実装 | 役割 |
//! |-------|---------|------|
//! | [`PayloadSource`] | [`RedisPayloadSource`] | チャンネルの購読 |
//! | [`NotificationSender`] | [`SmtpNotificationSender`] / [`NoopNotificationSender`] | メール送信 |
//! | [`DeadLetterPublisher`] | [`RedisDeadLetterPublisher`] | デッドレターの発行 |
//!
//! ## モジュール構成
//!
//! - [`redis`] - Redis クライアント・接続マネージャの作成
//! - [`pubsub`] - チャンネル購読と再購読
//! - [`notification`] - メール送信
//! - [`dead_letter`] - デッドレター発行
//! - [`error`] - インフラ層エラー定義

pub mod dead_letter;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod notification;
pub mod pubsub;
pub mod redis;

pub use dead_letter::{DeadLetterPublisher, RedisDeadLetterPublisher};
pub use error::InfraError;
pub use notification::{NoopNotificationSender, NotificationSender, SmtpNotificationSender};
pub use pubsub::{PayloadSource, PayloadStream, RedisPayloadSource};
