//! # Redis 接続管理
//!
//! Redis サーバーへの接続を作成する。
//!
//! ## Redis の用途
//!
//! | 用途 | 接続方式 | 実装 |
//! |------|---------|------|
//! | 通知チャンネルの購読 | 専用の `PubSub` 接続 | [`RedisPayloadSource`](crate::pubsub::RedisPayloadSource) |
//! | デッドレターの発行 | `ConnectionManager` | [`RedisDeadLetterPublisher`](crate::dead_letter::RedisDeadLetterPublisher) |
//!
//! SUBSCRIBE 中の接続は他のコマンドを発行できないため、購読と発行で接続を分ける。
//!
//! ## ConnectionManager vs PubSub
//!
//! `ConnectionManager` は切断時に自動で再接続するが、購読状態は復元しない。
//! 購読側の再接続は `RedisPayloadSource` が自前で行う。

use redis::{Client, aio::ConnectionManager};

use crate::InfraError;

/// Redis クライアントを作成する
///
/// この時点では接続しない。URL の形式のみ検証する。
///
/// # 引数
///
/// * `redis_url` - Redis 接続 URL
///   - 形式: `redis://[[username:]password@]host[:port][/database]`
///   - TLS: `rediss://` スキームで TLS 接続
pub fn create_client(redis_url: &str) -> Result<Client, InfraError> {
    Ok(Client::open(redis_url)?)
}

/// Redis 接続マネージャを作成する
///
/// アプリケーション起動時に一度だけ呼び出し、作成したマネージャを共有する。
/// Clone 可能で、切断時には自動的に再接続を試みる。
pub async fn create_connection_manager(client: Client) -> Result<ConnectionManager, InfraError> {
    Ok(ConnectionManager::new(client).await?)
}
