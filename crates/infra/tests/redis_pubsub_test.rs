//! Redis Pub/Sub 統合テスト
//!
//! 実際の Redis を使用する。テストごとに一意なチャンネル名を使う。
//!
//! 実行方法:
//! ```bash
//! docker run --rm -p 16379:6379 redis:7
//! cargo test -p alert-relay-infra --test redis_pubsub_test -- --ignored
//! ```

use std::time::Duration;

use alert_relay_domain::notification::{
    DeadLetter,
    FailureStage,
    MessageId,
    NotificationError,
};
use alert_relay_infra::{
    DeadLetterPublisher,
    PayloadSource,
    RedisDeadLetterPublisher,
    RedisPayloadSource,
    redis::{create_client, create_connection_manager},
};
use futures::StreamExt;
use redis::AsyncCommands;

/// テスト用の Redis URL
fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:16379".to_string())
}

/// テストごとに一意なチャンネル名
fn unique_channel(prefix: &str) -> String {
    format!("{prefix}:{}", MessageId::new())
}

#[tokio::test]
#[ignore = "Redis が必要"]
async fn test_購読したチャンネルに発行したペイロードを受信できる() {
    let client = create_client(&redis_url()).unwrap();
    let source = RedisPayloadSource::new(client.clone(), Duration::from_millis(100));
    let channel = unique_channel("alert:email:test");

    let mut stream = source.subscribe(&channel).await.unwrap();

    let mut conn = create_connection_manager(client).await.unwrap();
    let payload = r#"{"email":"a@b.com","code":482913}"#;
    let _: i64 = conn.publish(&channel, payload).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("タイムアウトしないこと");
    assert_eq!(received, Some(payload.as_bytes().to_vec()));
}

#[tokio::test]
#[ignore = "Redis が必要"]
async fn test_デッドレターをjsonで発行できる() {
    let client = create_client(&redis_url()).unwrap();
    let dead_letter_channel = unique_channel("alert:email:dead-letter:test");
    let source = RedisPayloadSource::new(client.clone(), Duration::from_millis(100));
    let mut stream = source.subscribe(&dead_letter_channel).await.unwrap();

    let conn = create_connection_manager(client).await.unwrap();
    let publisher = RedisDeadLetterPublisher::new(conn, dead_letter_channel.clone());
    let error = NotificationError::Decode("JSON として不正".to_string());
    let letter = DeadLetter::new(
        MessageId::new(),
        "alert:email",
        b"not-json",
        &error,
        chrono::Utc::now(),
    );

    publisher.publish(&letter).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("タイムアウトしないこと")
        .expect("ストリームが終了しないこと");
    let restored: DeadLetter = serde_json::from_slice(&received).unwrap();
    assert_eq!(restored.message_id, letter.message_id);
    assert_eq!(restored.stage, FailureStage::Decode);
    assert_eq!(restored.payload, "not-json");
}
