//! # Alert Relay 設定
//!
//! 環境変数から Alert Relay の設定を読み込む。
//!
//! 空文字列の環境変数は未設定として扱う。不正な値は起動時に [`ConfigError`] となる。

use std::{env, str::FromStr, time::Duration};

use alert_relay_infra::notification::{SmtpCredentials, SmtpSecurity, SmtpSettings};
use thiserror::Error;

/// 設定読み込みエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// 値の形式が不正
    #[error("{name} の値が不正です: {value:?}（{expected}）")]
    Invalid {
        name:     &'static str,
        value:    String,
        expected: &'static str,
    },

    /// SMTP 認証情報の片方だけが設定されている
    #[error("SMTP_USERNAME と SMTP_PASSWORD は両方設定するか、両方未設定にしてください")]
    PartialCredentials,
}

/// Alert Relay の設定
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Redis 接続 URL（`REDIS_URL` 優先、未設定なら `REDIS_HOST` / `REDIS_PORT` から組み立てる）
    pub redis_url: String,
    /// 購読チャンネル
    pub channel: String,
    /// デッドレターチャンネル（未設定でデッドレター無効）
    pub dead_letter_channel: Option<String>,
    /// 同時処理数の上限
    pub max_in_flight: u32,
    /// Redis 再購読の待機間隔
    pub redis_retry_interval: Duration,
    /// 通知設定
    pub notification: NotificationConfig,
}

/// 送信バックエンド
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationBackend {
    /// SMTP サーバー経由で送信
    Smtp,
    /// 送信しない（ログ出力のみ）
    Noop,
}

/// 通知機能の設定
///
/// `NOTIFICATION_BACKEND` 環境変数で送信バックエンドを切り替える:
/// - `smtp`: SMTP サーバー経由で送信（デフォルト）
/// - `noop`: 送信しない（ログ出力のみ）
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub backend: NotificationBackend,
    pub smtp:    SmtpSettings,
    /// メール件名
    pub subject: String,
}

impl RelayConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 任意のキー参照関数から設定を読み込む
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(&lookup);

        let redis_url = match vars.get("REDIS_URL") {
            Some(url) => url,
            None => {
                let host = vars.get_or("REDIS_HOST", "localhost");
                let port: u16 = vars.parse_or("REDIS_PORT", 6379, "ポート番号")?;
                format!("redis://{host}:{port}")
            }
        };

        Ok(Self {
            redis_url,
            channel: vars.get_or("ALERT_CHANNEL", "alert:email"),
            dead_letter_channel: vars.get("DEAD_LETTER_CHANNEL"),
            max_in_flight: vars.parse_positive_or("MAX_IN_FLIGHT", 16, "1 以上の整数")?,
            redis_retry_interval: Duration::from_secs(vars.parse_positive_or(
                "REDIS_RETRY_INTERVAL_SECS",
                5,
                "1 以上の秒数",
            )?),
            notification: NotificationConfig::from_vars(&vars)?,
        })
    }
}

impl NotificationConfig {
    fn from_vars<F>(vars: &Vars<'_, F>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match vars.get("NOTIFICATION_BACKEND").as_deref() {
            None | Some("smtp") => NotificationBackend::Smtp,
            Some("noop") => NotificationBackend::Noop,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name:     "NOTIFICATION_BACKEND",
                    value:    other.to_string(),
                    expected: "smtp | noop",
                });
            }
        };

        let security = match vars.get("SMTP_SECURITY") {
            None => SmtpSecurity::default(),
            Some(value) => SmtpSecurity::parse(&value).ok_or(ConfigError::Invalid {
                name: "SMTP_SECURITY",
                value,
                expected: "none | starttls | tls",
            })?,
        };

        let credentials = match (vars.get("SMTP_USERNAME"), vars.get("SMTP_PASSWORD")) {
            (Some(username), Some(password)) => Some(SmtpCredentials { username, password }),
            (None, None) => None,
            _ => return Err(ConfigError::PartialCredentials),
        };

        let smtp = SmtpSettings {
            host: vars.get_or("SMTP_HOST", "localhost"),
            port: vars.parse_or("SMTP_PORT", 1025, "ポート番号")?,
            security,
            credentials,
            timeout: Duration::from_secs(vars.parse_positive_or(
                "SMTP_TIMEOUT_SECS",
                30,
                "1 以上の秒数",
            )?),
            from_address: vars.get_or("NOTIFICATION_FROM_ADDRESS", "noreply@gitrank.example.com"),
        };

        Ok(Self {
            backend,
            smtp,
            subject: vars.get_or("NOTIFICATION_SUBJECT", "GitRank 조직 인증"),
        })
    }
}

/// 空文字列を未設定として扱うキー参照
struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|value| !value.trim().is_empty())
    }

    fn get_or(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T: FromStr>(
        &self,
        name: &'static str,
        default: T,
        expected: &'static str,
    ) -> Result<T, ConfigError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                name,
                value,
                expected,
            }),
        }
    }

    /// 0 を不正な値として扱う `parse_or`
    fn parse_positive_or<T>(
        &self,
        name: &'static str,
        default: T,
        expected: &'static str,
    ) -> Result<T, ConfigError>
    where
        T: FromStr + Default + PartialEq,
    {
        let value = self.parse_or(name, default, expected)?;
        if value == T::default() {
            return Err(ConfigError::Invalid {
                name,
                value: self.get(name).unwrap_or_default(),
                expected,
            });
        }
        Ok(value)
    }
}
