//! # デッドレター発行
//!
//! 処理に失敗したメッセージを Redis のデッドレターチャンネルへ JSON で PUBLISH する。
//!
//! Redis Pub/Sub は永続化しないため、デッドレターを保管したい場合は
//! 別プロセスがこのチャンネルを購読して保存する必要がある。
//! 購読者がいない時点で発行されたデッドレターは失われる。

use alert_relay_domain::notification::DeadLetter;
use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};

use crate::InfraError;

/// デッドレター発行トレイト
#[async_trait]
pub trait DeadLetterPublisher: Send + Sync {
    /// デッドレターを発行する
    async fn publish(&self, letter: &DeadLetter) -> Result<(), InfraError>;
}

/// Redis PUBLISH によるデッドレター発行
pub struct RedisDeadLetterPublisher {
    conn:    ConnectionManager,
    channel: String,
}

impl RedisDeadLetterPublisher {
    pub fn new(conn: ConnectionManager, channel: impl Into<String>) -> Self {
        Self {
            conn,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl DeadLetterPublisher for RedisDeadLetterPublisher {
    async fn publish(&self, letter: &DeadLetter) -> Result<(), InfraError> {
        let body = serde_json::to_string(letter)?;

        // ConnectionManager は Clone が安価で、コマンド発行に &mut を要求する
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(&self.channel, body).await?;

        tracing::debug!(
            channel = %self.channel,
            message.id = %letter.message_id,
            receivers,
            "デッドレターを発行しました"
        );

        Ok(())
    }
}
