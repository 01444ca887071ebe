//! SMTP 通知送信実装
//!
//! lettre の `AsyncSmtpTransport` を使用してメールを送信する。
//! 開発環境では Mailpit（ローカル SMTP サーバー、TLS なし）に接続し、
//! 本番では STARTTLS / TLS と認証情報を設定する。

use std::{fmt, time::Duration};

use alert_relay_domain::notification::{EmailMessage, NotificationError};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport,
    AsyncTransport,
    Tokio1Executor,
    message::{Mailbox, Message, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};

use super::NotificationSender;
use crate::InfraError;

/// SMTP 接続のセキュリティ方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmtpSecurity {
    /// 平文（Mailpit 等のローカル SMTP 向け）
    #[default]
    None,
    /// 平文で接続後に STARTTLS で昇格（通常ポート 587）
    StartTls,
    /// 接続時から TLS（通常ポート 465）
    Tls,
}

impl SmtpSecurity {
    /// 文字列からセキュリティ方式をパースする
    ///
    /// `none` / `starttls` / `tls` 以外は `None` を返す。
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "starttls" => Some(Self::StartTls),
            "tls" => Some(Self::Tls),
            _ => None,
        }
    }
}

/// SMTP 認証情報
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for SmtpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// SMTP 送信設定
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    /// SMTP サーバーのホスト名（例: "localhost"）
    pub host:         String,
    /// SMTP サーバーのポート番号（例: 1025 for Mailpit）
    pub port:         u16,
    pub security:     SmtpSecurity,
    pub credentials:  Option<SmtpCredentials>,
    /// 1 通あたりの送信タイムアウト
    pub timeout:      Duration,
    /// 送信元メールアドレス
    pub from_address: String,
}

/// SMTP 通知送信
///
/// `lettre::AsyncSmtpTransport<Tokio1Executor>` をラップする。
pub struct SmtpNotificationSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from:      Mailbox,
}

impl SmtpNotificationSender {
    /// 新しい SMTP 送信インスタンスを作成
    ///
    /// 接続はまだ行わない。送信元アドレスの形式と TLS 設定のみ検証する。
    pub fn new(settings: SmtpSettings) -> Result<Self, InfraError> {
        let from: Mailbox = settings
            .from_address
            .parse()
            .map_err(|e| InfraError::mail_transport(format!("送信元アドレス不正: {e}")))?;

        let builder = match settings.security {
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
            }
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                    .map_err(|e| InfraError::mail_transport(format!("STARTTLS 設定失敗: {e}")))?
            }
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
                .map_err(|e| InfraError::mail_transport(format!("TLS 設定失敗: {e}")))?,
        };

        let mut builder = builder
            .port(settings.port)
            .timeout(Some(settings.timeout));
        if let Some(credentials) = settings.credentials {
            builder =
                builder.credentials(Credentials::new(credentials.username, credentials.password));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl NotificationSender for SmtpNotificationSender {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotificationError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(email
                .to
                .parse()
                .map_err(|e| NotificationError::SendFailed(format!("宛先アドレス不正: {e}")))?)
            .subject(&email.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html_body.clone()),
                    ),
            )
            .map_err(|e| NotificationError::SendFailed(format!("メッセージ構築失敗: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotificationError::SendFailed(format!("SMTP 送信失敗: {e}")))?;

        Ok(())
    }
}
