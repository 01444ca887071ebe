//! # メール送信
//!
//! 認証コードメールを実際に届ける部分。アプリ層は [`NotificationSender`] だけに依存し、
//! 実装は起動時に `NOTIFICATION_BACKEND` で選ぶ。
//!
//! | 値 | 実装 |
//! |----|------|
//! | `smtp` | [`SmtpNotificationSender`]（lettre） |
//! | `noop` | [`NoopNotificationSender`] |

mod noop;
mod smtp;

use alert_relay_domain::notification::{EmailMessage, NotificationError};
use async_trait::async_trait;
pub use noop::NoopNotificationSender;
pub use smtp::{SmtpCredentials, SmtpNotificationSender, SmtpSecurity, SmtpSettings};

/// 1 通のメールを送る
///
/// 完了（成功または失敗）まで戻らない。再送は行わない。
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotificationError>;
}
