//! # チャンネル購読
//!
//! ブローカーのチャンネルからペイロードを受信する。
//!
//! ## 設計方針
//!
//! - **trait による抽象化**: [`PayloadSource`] でブローカーを抽象化し、
//!   購読側（アプリ層）はバイト列のストリームだけを扱う
//! - **再購読はブローカークライアントの責務**: Redis の `PubSub` 接続は切断時に
//!   購読状態を失うため、[`RedisPayloadSource`] が再接続と再 SUBSCRIBE を行う
//! - **背圧**: 受信したペイロードは容量付きの mpsc チャンネル経由で渡す。
//!   消費側が詰まると Redis からの読み出しも止まる
//!
//! ```text
//! Redis ──SUBSCRIBE──▶ forward タスク ──mpsc──▶ PayloadStream ──▶ ChannelSubscriber
//!            ▲                │
//!            └── 切断時に再接続 ┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures::{
    Stream,
    StreamExt,
    stream::{self, BoxStream},
};
use redis::{Client, aio::PubSub};
use tokio::sync::mpsc;

use crate::InfraError;

/// 受信ペイロードのストリーム
///
/// ストリームが終了するのは、ブローカークライアントが購読を継続できなくなった場合のみ。
pub type PayloadStream = BoxStream<'static, Vec<u8>>;

/// 受信バッファの容量
const PAYLOAD_BUFFER: usize = 64;

/// ペイロード受信トレイト
#[async_trait]
pub trait PayloadSource: Send + Sync {
    /// チャンネルを購読し、受信ペイロードのストリームを返す
    ///
    /// 最初の購読に失敗した場合はエラーを返す。購読成功後の切断は
    /// 実装側で処理し、ストリームには現れない。
    async fn subscribe(&self, channel: &str) -> Result<PayloadStream, InfraError>;
}

/// mpsc の受信側をストリームに変換する
pub(crate) fn receiver_stream(rx: mpsc::Receiver<Vec<u8>>) -> PayloadStream {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|payload| (payload, rx)) })
        .boxed()
}

/// Redis Pub/Sub によるペイロード受信
pub struct RedisPayloadSource {
    client:         Client,
    retry_interval: Duration,
}

impl RedisPayloadSource {
    /// 新しい受信インスタンスを作成
    ///
    /// # 引数
    ///
    /// - `client`: Redis クライアント（購読専用の接続をここから開く）
    /// - `retry_interval`: 切断後の再購読を試みる間隔
    pub fn new(client: Client, retry_interval: Duration) -> Self {
        Self {
            client,
            retry_interval,
        }
    }
}

#[async_trait]
impl PayloadSource for RedisPayloadSource {
    async fn subscribe(&self, channel: &str) -> Result<PayloadStream, InfraError> {
        let pubsub = open_subscription(&self.client, channel).await?;
        tracing::info!(channel, "チャンネルを購読しました");

        let (tx, rx) = mpsc::channel(PAYLOAD_BUFFER);
        tokio::spawn(forward(
            self.client.clone(),
            channel.to_string(),
            pubsub,
            tx,
            self.retry_interval,
        ));

        Ok(receiver_stream(rx))
    }
}

/// 購読専用の接続を開き、チャンネルを SUBSCRIBE する
async fn open_subscription(client: &Client, channel: &str) -> Result<PubSub, InfraError> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;
    Ok(pubsub)
}

/// 転送ループが終了した理由
#[derive(Debug, PartialEq, Eq)]
enum RelayEnd {
    /// 受信メッセージのストリームが終了した（接続断）
    Disconnected,
    /// 受信側（`PayloadStream`）が破棄された
    ReceiverClosed,
}

/// ストリームのペイロードを mpsc に送り続ける
///
/// メッセージを待っている間も受信側の破棄を監視し、破棄されたら次のメッセージを
/// 待たずに戻る。
async fn relay_payloads<S>(messages: S, tx: &mpsc::Sender<Vec<u8>>) -> RelayEnd
where
    S: Stream<Item = Vec<u8>>,
{
    tokio::pin!(messages);
    loop {
        tokio::select! {
            () = tx.closed() => return RelayEnd::ReceiverClosed,
            next = messages.next() => match next {
                Some(payload) => {
                    if tx.send(payload).await.is_err() {
                        return RelayEnd::ReceiverClosed;
                    }
                }
                None => return RelayEnd::Disconnected,
            },
        }
    }
}

/// 受信メッセージを mpsc に転送し、切断されたら再購読する
///
/// 受信側（ストリーム）が破棄されたら接続を閉じて終了する。
async fn forward(
    client: Client,
    channel: String,
    mut pubsub: PubSub,
    tx: mpsc::Sender<Vec<u8>>,
    retry_interval: Duration,
) {
    loop {
        let messages = pubsub
            .into_on_message()
            .map(|msg| msg.get_payload_bytes().to_vec());
        if relay_payloads(messages, &tx).await == RelayEnd::ReceiverClosed {
            tracing::debug!(channel = %channel, "受信側が閉じられたため転送を終了します");
            return;
        }

        tracing::warn!(
            error.category = "infrastructure",
            error.kind = "broker",
            channel = %channel,
            "Redis との購読接続が切断されました。再購読を試みます"
        );

        pubsub = loop {
            tokio::select! {
                () = tx.closed() => return,
                () = tokio::time::sleep(retry_interval) => {}
            }

            match open_subscription(&client, &channel).await {
                Ok(pubsub) => {
                    tracing::info!(channel = %channel, "チャンネルを再購読しました");
                    break pubsub;
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        error.category = "infrastructure",
                        error.kind = "broker",
                        error = %e,
                        channel = %channel,
                        "再購読に失敗しました"
                    );
                }
                // 認証エラーなど。設定を直すまで回復しないが、再試行は続ける
                Err(e) => {
                    tracing::error!(
                        error.category = "infrastructure",
                        error.kind = "broker",
                        error = %e,
                        channel = %channel,
                        "再購読に失敗しました（接続以外のエラー）"
                    );
                }
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn receiver_streamが送信順にペイロードを返し送信側の破棄で終了する() {
        let (tx, rx) = mpsc::channel(4);
        let mut stream = receiver_stream(rx);

        tx.send(b"first".to_vec()).await.unwrap();
        tx.send(b"second".to_vec()).await.unwrap();
        drop(tx);

        assert_eq!(stream.next().await, Some(b"first".to_vec()));
        assert_eq!(stream.next().await, Some(b"second".to_vec()));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn 受信側が破棄されたら次のメッセージを待たずに転送を終了する() {
        let (tx, rx) = mpsc::channel(4);
        let relay = tokio::spawn(async move { relay_payloads(stream::pending(), &tx).await });

        drop(rx);

        let end = tokio::time::timeout(Duration::from_secs(5), relay)
            .await
            .expect("転送ループが終了しなかった")
            .unwrap();
        assert_eq!(end, RelayEnd::ReceiverClosed);
    }

    #[tokio::test]
    async fn ストリームが終了したら切断として扱う() {
        let (tx, mut rx) = mpsc::channel(4);
        let messages = stream::iter(vec![b"first".to_vec(), b"second".to_vec()]);

        let end = relay_payloads(messages, &tx).await;

        assert_eq!(end, RelayEnd::Disconnected);
        assert_eq!(rx.recv().await, Some(b"first".to_vec()));
        assert_eq!(rx.recv().await, Some(b"second".to_vec()));
    }

    #[test]
    fn トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RedisPayloadSource>();
    }
}
