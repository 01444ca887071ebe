//! # Alert Relay
//!
//! Redis Pub/Sub のチャンネルから認証コード通知を受信し、メールとして送信する。
//!
//! ```text
//! ┌──────────┐  PUBLISH   ┌─────────┐  SUBSCRIBE  ┌─────────────┐  SMTP  ┌──────────┐
//! │ Producer │───────────→│  Redis  │────────────→│ Alert Relay │───────→│ 受信者   │
//! └──────────┘alert:email └─────────┘             └─────────────┘        └──────────┘
//! ```
//!
//! 送信は fire-and-forget で、失敗したメッセージは再送しない。
//!
//! ## モジュール構成
//!
//! - [`config`] - 環境変数からの設定読み込み
//! - [`subscriber`] - チャンネル購読と同時処理数の制御
//! - [`usecase`] - デコード・レンダリング・送信

pub mod config;
pub mod subscriber;
pub mod usecase;
