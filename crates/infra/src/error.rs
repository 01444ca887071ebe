//! # インフラ層エラー定義
//!
//! ブローカー（Redis）とメール転送の設定・通信で発生するエラー。
//!
//! 種別は [`InfraErrorKind`] で表し、[`InfraError`] は種別に加えて生成時点の
//! [`SpanTrace`] を持つ。メッセージ処理中に発生したエラーであれば、
//! トレースに `message.id` を持つスパンが含まれる。
//!
//! 個々のメール送信失敗はここではなく `NotificationError::SendFailed` で扱う。
//! 送信失敗はメッセージ単位で終端し、呼び出し元に伝播しないため。

use derive_more::Display;
use thiserror::Error;
use tracing_error::SpanTrace;

/// インフラ層エラー
#[derive(Debug, Display)]
#[display("{kind}")]
pub struct InfraError {
    kind:       InfraErrorKind,
    span_trace: SpanTrace,
}

#[derive(Debug, Error)]
pub enum InfraErrorKind {
    /// 接続・SUBSCRIBE・PUBLISH の失敗、URL の形式不正
    #[error("ブローカーとの通信に失敗: {0}")]
    Broker(#[source] redis::RedisError),

    /// デッドレターの JSON 変換に失敗
    #[error("JSON 変換に失敗: {0}")]
    Serialization(#[source] serde_json::Error),

    /// メール転送の設定が不正（送信元アドレス、TLS 設定）
    ///
    /// lettre のエラー型はビルダーごとに異なるため文字列で保持する。
    #[error("メール転送の設定が不正: {0}")]
    MailTransport(String),

    /// 同じソースから 2 回目の購読を試みた
    #[error("チャンネル {channel} は既に購読済み")]
    AlreadySubscribed { channel: String },
}

impl InfraError {
    fn new(kind: InfraErrorKind) -> Self {
        Self {
            kind,
            span_trace: SpanTrace::capture(),
        }
    }

    pub fn kind(&self) -> &InfraErrorKind {
        &self.kind
    }

    pub fn span_trace(&self) -> &SpanTrace {
        &self.span_trace
    }

    pub fn mail_transport(msg: impl Into<String>) -> Self {
        Self::new(InfraErrorKind::MailTransport(msg.into()))
    }

    pub fn already_subscribed(channel: impl Into<String>) -> Self {
        Self::new(InfraErrorKind::AlreadySubscribed {
            channel: channel.into(),
        })
    }

    /// 接続断など、時間をおけば回復しうるエラーか
    pub fn is_transient(&self) -> bool {
        match &self.kind {
            InfraErrorKind::Broker(e) => {
                matches!(e.kind(), redis::ErrorKind::Io) || e.is_connection_dropped()
            }
            _ => false,
        }
    }
}

impl std::error::Error for InfraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.kind)
    }
}

impl From<redis::RedisError> for InfraError {
    fn from(source: redis::RedisError) -> Self {
        Self::new(InfraErrorKind::Broker(source))
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(source: serde_json::Error) -> Self {
        Self::new(InfraErrorKind::Serialization(source))
    }
}
