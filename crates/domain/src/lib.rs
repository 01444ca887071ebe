//! # Alert Relay ドメイン層
//!
//! 通知リレーが扱うドメインモデルを定義する。
//!
//! ## 設計方針
//!
//! - **値オブジェクト**: メールアドレスや認証コードは生成時に検証し、
//!   不正な値が送信処理に到達しないことを型で保証する
//! - **ドメインエラー**: 入力不備や送信失敗を `thiserror` の列挙型で表現する
//!
//! ## 依存関係の方向
//!
//! ```text
//! app → infra → domain
//!  ↓ ↘________↗
//! shared
//! ```
//!
//! ドメイン層は Redis や SMTP などのインフラに一切依存しない。
//!
//! ## モジュール構成
//!
//! - [`error`] - 値オブジェクトの検証エラー
//! - [`notification`] - 通知リクエスト、メールメッセージ、デッドレター
//!
//! ## 使用例
//!
//! ```rust
//! use alert_relay_domain::notification::NotificationRequest;
//!
//! let request = NotificationRequest::from_payload(br#"{"email":"a@b.com","code":482913}"#)?;
//! assert_eq!(request.recipient().as_str(), "a@b.com");
//! assert_eq!(request.code().to_string(), "482913");
//! # Ok::<(), alert_relay_domain::notification::NotificationError>(())
//! ```

pub mod error;
pub mod notification;

pub use error::DomainError;
