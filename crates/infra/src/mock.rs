//! # テスト用モック
//!
//! ユースケーステストで使用するインメモリモック。
//! `test-utils` feature を有効にすることで、他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! alert-relay-infra = { workspace = true, features = ["test-utils"] }
//! ```

use std::{
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use alert_relay_domain::notification::{DeadLetter, EmailMessage, NotificationError};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    InfraError,
    dead_letter::DeadLetterPublisher,
    notification::NotificationSender,
    pubsub::{PayloadSource, PayloadStream, receiver_stream},
};

// ===== MockNotificationSender =====

/// 送信したメールを記録するモック
///
/// `failing()` で全送信を失敗させ、`fail_next(n)` で直近 n 件だけ失敗させる。
/// `with_delay()` で送信に時間がかかる状況を再現し、同時実行数を計測できる。
#[derive(Clone, Default)]
pub struct MockNotificationSender {
    sent:          Arc<Mutex<Vec<EmailMessage>>>,
    attempts:      Arc<AtomicUsize>,
    fail_all:      Arc<AtomicBool>,
    fail_next:     Arc<AtomicUsize>,
    delay:         Option<Duration>,
    in_flight:     Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// 常に送信に失敗するモックを作成する
    pub fn failing() -> Self {
        let sender = Self::default();
        sender.fail_all.store(true, Ordering::SeqCst);
        sender
    }

    /// 次の `count` 件の送信を失敗させる
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// 送信ごとに `delay` だけ待機する
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 送信に成功したメール
    pub fn sent_emails(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// 成功・失敗を問わない送信試行回数
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// 観測された最大同時送信数
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        if self.fail_all.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl NotificationSender for MockNotificationSender {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotificationError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.should_fail() {
            Err(NotificationError::SendFailed(
                "モック: SMTP 接続拒否".to_string(),
            ))
        } else {
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ===== MockDeadLetterPublisher =====

/// 発行されたデッドレターを記録するモック
#[derive(Clone, Default)]
pub struct MockDeadLetterPublisher {
    letters: Arc<Mutex<Vec<DeadLetter>>>,
    failing: bool,
}

impl MockDeadLetterPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 常に発行に失敗するモックを作成する
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeadLetterPublisher for MockDeadLetterPublisher {
    async fn publish(&self, letter: &DeadLetter) -> Result<(), InfraError> {
        if self.failing {
            let e = redis::RedisError::from((redis::ErrorKind::Io, "モック: PUBLISH 失敗"));
            return Err(e.into());
        }
        self.letters.lock().unwrap().push(letter.clone());
        Ok(())
    }
}

// ===== MockPayloadSource =====

/// インメモリのチャンネル
///
/// [`MockPayloadPublisher`] から送ったペイロードが購読ストリームに流れる。
/// 購読できるのは 1 回だけで、2 回目の `subscribe` はエラーになる。
pub struct MockPayloadSource {
    receiver:      Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    subscriptions: Mutex<Vec<String>>,
}

/// [`MockPayloadSource`] にペイロードを送る側
///
/// 破棄すると購読ストリームが終了する。
#[derive(Clone)]
pub struct MockPayloadPublisher {
    tx: mpsc::Sender<Vec<u8>>,
}

impl MockPayloadSource {
    pub fn new() -> (Self, MockPayloadPublisher) {
        let (tx, rx) = mpsc::channel(64);
        let source = Self {
            receiver:      Mutex::new(Some(rx)),
            subscriptions: Mutex::new(Vec::new()),
        };
        (source, MockPayloadPublisher { tx })
    }

    /// `subscribe` が呼ばれたチャンネル名（呼び出し順）
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }
}

impl MockPayloadPublisher {
    pub async fn publish(&self, payload: impl Into<Vec<u8>>) {
        self.tx
            .send(payload.into())
            .await
            .expect("購読ストリームが破棄されていないこと");
    }
}

#[async_trait]
impl PayloadSource for MockPayloadSource {
    async fn subscribe(&self, channel: &str) -> Result<PayloadStream, InfraError> {
        self.subscriptions.lock().unwrap().push(channel.to_string());
        let rx = self
            .receiver
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| InfraError::already_subscribed(channel))?;
        Ok(receiver_stream(rx))
    }
}

#[cfg(test)]
mod tests {
    use alert_relay_domain::notification::{FailureStage, MessageId};
    use futures::StreamExt;
    use pretty_assertions::assert_eq;

    use super::*;

    fn make_email() -> EmailMessage {
        EmailMessage {
            to:        "a@b.com".to_string(),
            subject:   "件名".to_string(),
            html_body: "<h1>1</h1>".to_string(),
            text_body: "1".to_string(),
        }
    }

    #[tokio::test]
    async fn fail_nextで指定件数だけ失敗する() {
        let sender = MockNotificationSender::new();
        sender.fail_next(1);

        assert!(sender.send_email(&make_email()).await.is_err());
        assert!(sender.send_email(&make_email()).await.is_ok());
        assert_eq!(sender.attempts(), 2);
        assert_eq!(sender.sent_emails().len(), 1);
    }

    #[tokio::test]
    async fn payload_sourceは2回目の購読でエラーを返す() {
        let (source, publisher) = MockPayloadSource::new();

        let mut stream = source.subscribe("alert:email").await.unwrap();
        publisher.publish("hello").await;
        assert_eq!(stream.next().await, Some(b"hello".to_vec()));

        assert!(source.subscribe("alert:email").await.is_err());
        assert_eq!(source.subscriptions(), vec!["alert:email", "alert:email"]);
    }

    #[tokio::test]
    async fn dead_letter_publisherが発行内容を記録する() {
        let publisher = MockDeadLetterPublisher::new();
        let error = NotificationError::Decode("不正".to_string());
        let letter = DeadLetter::new(
            MessageId::new(),
            "alert:email",
            b"x",
            &error,
            chrono::Utc::now(),
        );

        publisher.publish(&letter).await.unwrap();

        let letters = publisher.letters();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].stage, FailureStage::Decode);
    }
}
