//! # チャンネル購読
//!
//! ブローカーのチャンネルを購読し、受信したペイロードを 1 件ずつ
//! [`MessageHandler`] に渡す。
//!
//! ## 設計方針
//!
//! - **受信ループを止めない**: 各メッセージは独立したタスクで処理し、
//!   ハンドラーの失敗やパニックは購読ループに影響しない
//! - **同時処理数の上限**: セマフォで `max_in_flight` 件に制限する。上限に達すると
//!   受信を一時停止し、その間のメッセージはブローカー側のバッファに溜まる
//! - **再接続はブローカークライアントの責務**: 接続断からの再購読は
//!   `PayloadSource` 実装側で行う

use std::sync::Arc;

use alert_relay_domain::notification::MessageId;
use alert_relay_infra::{InfraError, PayloadSource, PayloadStream};
use alert_relay_shared::{event_log::event, log_business_event};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::{
    sync::{Mutex, Semaphore},
    task::JoinHandle,
};
use tracing::Instrument;

/// 受信メッセージのハンドラー
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// ペイロード 1 件を処理する
    ///
    /// 戻り値を持たない。失敗はハンドラー内で完結させる。
    async fn on_message(&self, message_id: MessageId, payload: &[u8]);
}

/// チャンネル購読者
///
/// `start()` で購読を開始し、`shutdown()` で停止する。
pub struct ChannelSubscriber {
    channel:       String,
    source:        Arc<dyn PayloadSource>,
    handler:       Arc<dyn MessageHandler>,
    max_in_flight: u32,
    permits:       Arc<Semaphore>,
    consumer:      Mutex<Option<JoinHandle<()>>>,
}

impl ChannelSubscriber {
    /// `max_in_flight` が 0 の場合は 1 として扱う
    pub fn new(
        channel: impl Into<String>,
        source: Arc<dyn PayloadSource>,
        handler: Arc<dyn MessageHandler>,
        max_in_flight: u32,
    ) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            channel: channel.into(),
            source,
            handler,
            max_in_flight,
            permits: Arc::new(Semaphore::new(max_in_flight as usize)),
            consumer: Mutex::new(None),
        }
    }

    /// 購読を開始する
    ///
    /// 既に開始済みの場合は何もしない（二重購読しない）。
    /// 購読の確立に失敗した場合はエラーを返し、未開始のまま残る。
    pub async fn start(&self) -> Result<(), InfraError> {
        let mut consumer = self.consumer.lock().await;
        if consumer.is_some() {
            tracing::debug!(channel = %self.channel, "既に購読を開始済みです");
            return Ok(());
        }

        let stream = self.source.subscribe(&self.channel).await?;

        log_business_event!(
            event.category = event::category::SUBSCRIPTION,
            event.action = event::action::SUBSCRIPTION_STARTED,
            event.result = event::result::SUCCESS,
            channel = %self.channel,
            max_in_flight = self.max_in_flight,
            "チャンネルの購読を開始しました"
        );

        *consumer = Some(tokio::spawn(consume(
            self.channel.clone(),
            stream,
            Arc::clone(&self.handler),
            Arc::clone(&self.permits),
        )));

        Ok(())
    }

    /// 購読中かどうか
    pub async fn is_running(&self) -> bool {
        self.consumer
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// 購読を停止する
    ///
    /// 新たな受信を止めた後、処理中のメッセージがすべて完了するまで待つ。
    /// 未開始の場合は何もしない。
    pub async fn shutdown(&self) {
        let Some(consumer) = self.consumer.lock().await.take() else {
            return;
        };

        consumer.abort();
        // abort による JoinError（cancelled）は想定どおり
        let _ = consumer.await;

        // 全 permit を取得できた時点で処理中のメッセージはない
        if self.permits.acquire_many(self.max_in_flight).await.is_err() {
            tracing::warn!(channel = %self.channel, "セマフォが閉じられています");
        }

        log_business_event!(
            event.category = event::category::SUBSCRIPTION,
            event.action = event::action::SUBSCRIPTION_STOPPED,
            event.result = event::result::SUCCESS,
            channel = %self.channel,
            "チャンネルの購読を停止しました"
        );
    }
}

/// 受信ループ
///
/// permit を取得してからメッセージごとにタスクを起動する。
/// permit はタスク完了時に解放される。
async fn consume(
    channel: String,
    mut stream: PayloadStream,
    handler: Arc<dyn MessageHandler>,
    permits: Arc<Semaphore>,
) {
    let mut saturated = false;

    while let Some(payload) = stream.next().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };

        let now_saturated = permits.available_permits() == 0;
        if now_saturated && !saturated {
            tracing::warn!(
                channel = %channel,
                "同時処理数が上限に達しました。空きが出るまで受信を待機します"
            );
        }
        saturated = now_saturated;

        let message_id = MessageId::new();
        let span = tracing::info_span!("message", message.id = %message_id, channel = %channel);
        let handler = Arc::clone(&handler);

        tokio::spawn(
            async move {
                handler.on_message(message_id, &payload).await;
                drop(permit);
            }
            .instrument(span),
        );
    }

    tracing::warn!(
        error.category = "infrastructure",
        error.kind = "broker",
        channel = %channel,
        "購読ストリームが終了しました"
    );
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Mutex as StdMutex,
            atomic::{AtomicBool, Ordering},
        },
        time::Duration,
    };

    use alert_relay_infra::mock::MockPayloadSource;
    use pretty_assertions::assert_eq;

    use super::*;

    /// 受信したペイロードを記録するハンドラー
    #[derive(Default)]
    struct RecordingHandler {
        payloads: StdMutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        async fn on_message(&self, _message_id: MessageId, payload: &[u8]) {
            self.payloads.lock().unwrap().push(payload.to_vec());
        }
    }

    /// 最初のペイロードでだけパニックし、以降は記録するハンドラー
    #[derive(Default)]
    struct PanicOnFirstHandler {
        panicked: AtomicBool,
        recorded: RecordingHandler,
    }

    #[async_trait]
    impl MessageHandler for PanicOnFirstHandler {
        async fn on_message(&self, message_id: MessageId, payload: &[u8]) {
            if !self.panicked.swap(true, Ordering::SeqCst) {
                panic!("ハンドラー内のパニック");
            }
            self.recorded.on_message(message_id, payload).await;
        }
    }

    #[tokio::test]
    async fn startを2回呼んでも購読は1回だけ() {
        let (source, _publisher) = MockPayloadSource::new();
        let source = Arc::new(source);
        let subscriber = ChannelSubscriber::new(
            "alert:email",
            source.clone(),
            Arc::new(RecordingHandler::default()),
            4,
        );

        subscriber.start().await.unwrap();
        subscriber.start().await.unwrap();

        assert_eq!(source.subscriptions(), vec!["alert:email"]);
        assert!(subscriber.is_running().await);
    }

    #[tokio::test]
    async fn 受信したペイロードをハンドラーに渡す() {
        let (source, publisher) = MockPayloadSource::new();
        let handler = Arc::new(RecordingHandler::default());
        let subscriber =
            ChannelSubscriber::new("alert:email", Arc::new(source), handler.clone(), 4);

        subscriber.start().await.unwrap();
        publisher.publish("hello").await;
        drop(publisher);
        tokio::time::sleep(Duration::from_millis(50)).await;
        subscriber.shutdown().await;

        assert_eq!(*handler.payloads.lock().unwrap(), vec![b"hello".to_vec()]);
    }

    #[tokio::test]
    async fn ハンドラーがパニックしても次のメッセージを処理する() {
        let (source, publisher) = MockPayloadSource::new();
        let handler = Arc::new(PanicOnFirstHandler::default());
        let subscriber =
            ChannelSubscriber::new("alert:email", Arc::new(source), handler.clone(), 1);

        subscriber.start().await.unwrap();
        publisher.publish("1").await;
        publisher.publish("2").await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while handler.recorded.payloads.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("2 件目のメッセージが処理されなかった");

        assert!(subscriber.is_running().await);
        subscriber.shutdown().await;
        assert!(handler.panicked.load(Ordering::SeqCst));
        assert_eq!(*handler.recorded.payloads.lock().unwrap(), vec![b"2".to_vec()]);
    }

    #[tokio::test]
    async fn 未開始のshutdownは何もしない() {
        let (source, _publisher) = MockPayloadSource::new();
        let subscriber = ChannelSubscriber::new(
            "alert:email",
            Arc::new(source),
            Arc::new(RecordingHandler::default()),
            1,
        );

        subscriber.shutdown().await;

        assert!(!subscriber.is_running().await);
    }

    #[test]
    fn max_in_flightが0の場合は1として扱う() {
        let (source, _publisher) = MockPayloadSource::new();
        let subscriber = ChannelSubscriber::new(
            "alert:email",
            Arc::new(source),
            Arc::new(RecordingHandler::default()),
            0,
        );

        assert_eq!(subscriber.permits.available_permits(), 1);
    }
}
