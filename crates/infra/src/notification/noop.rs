//! 送信しない NotificationSender
//!
//! `NOTIFICATION_BACKEND=noop` で使う。SMTP サーバーなしで Redis 側の
//! 疎通だけを確認したいときに、宛先のドメインと件名だけをログに残す。

use alert_relay_domain::notification::{EmailMessage, NotificationError};
use async_trait::async_trait;

use super::NotificationSender;

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotificationSender;

#[async_trait]
impl NotificationSender for NoopNotificationSender {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotificationError> {
        let recipient_domain = email.to.rsplit_once('@').map_or("", |(_, domain)| domain);
        tracing::info!(
            notification.recipient_domain = recipient_domain,
            subject = %email.subject,
            html_len = email.html_body.len(),
            "Noop: 認証コードメールを送信せずに破棄しました"
        );
        Ok(())
    }
}
