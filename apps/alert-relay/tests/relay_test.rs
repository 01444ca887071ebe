//! 購読からメール送信までの結合テスト
//!
//! Redis と SMTP はインメモリのモックに差し替える。

use std::{sync::Arc, time::Duration};

use alert_relay::{
    subscriber::ChannelSubscriber,
    usecase::{NotificationDispatcher, TemplateRenderer},
};
use alert_relay_domain::notification::FailureStage;
use alert_relay_infra::mock::{
    MockDeadLetterPublisher,
    MockNotificationSender,
    MockPayloadPublisher,
    MockPayloadSource,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use tokio_test::assert_pending;

const CHANNEL: &str = "alert:email";

struct Relay {
    subscriber:   ChannelSubscriber,
    publisher:    MockPayloadPublisher,
    sender:       MockNotificationSender,
    dead_letters: MockDeadLetterPublisher,
}

impl Relay {
    async fn start(sender: MockNotificationSender, max_in_flight: u32) -> Self {
        let (source, publisher) = MockPayloadSource::new();
        let dead_letters = MockDeadLetterPublisher::new();
        let dispatcher = NotificationDispatcher::new(
            Arc::new(sender.clone()),
            TemplateRenderer::new().unwrap(),
            CHANNEL,
            "GitRank 조직 인증",
        )
        .with_dead_letters(Arc::new(dead_letters.clone()));

        let subscriber = ChannelSubscriber::new(
            CHANNEL,
            Arc::new(source),
            Arc::new(dispatcher),
            max_in_flight,
        );
        subscriber.start().await.unwrap();

        Self {
            subscriber,
            publisher,
            sender,
            dead_letters,
        }
    }

    /// 送信成功またはデッドレターとして終端したメッセージ数
    fn finished(&self) -> usize {
        self.sender.sent_emails().len() + self.dead_letters.letters().len()
    }

    /// `count` 件が終端するまで待ってから購読を停止する
    async fn drain(&self, count: usize) {
        wait_until(|| self.finished() >= count).await;
        self.subscriber.shutdown().await;
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("5 秒以内に条件が満たされること");
}

#[tokio::test]
async fn 正しいペイロードで1通送信する() {
    let relay = Relay::start(MockNotificationSender::new(), 4).await;

    relay
        .publisher
        .publish(r#"{"email":"a@b.com","code":482913}"#)
        .await;
    relay.drain(1).await;

    let sent = relay.sender.sent_emails();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "a@b.com");
    assert!(sent[0].html_body.contains("482913"));
    assert!(relay.dead_letters.letters().is_empty());
}

#[rstest]
#[case::codeが欠落(r#"{"email":"a@b.com"}"#)]
#[case::json以外("not-json")]
#[case::codeが数値でない(r#"{"email":"a@b.com","code":"482913"}"#)]
#[case::不正なアドレス(r#"{"email":"not-an-address","code":1}"#)]
#[case::atが2つのアドレス(r#"{"email":"a@b@c.com","code":1}"#)]
#[case::カンマ区切りの複数アドレス(r#"{"email":"a@b.com,evil@x.com","code":1}"#)]
#[case::引用符を含むアドレス(r#"{"email":"a@\"x","code":1}"#)]
#[tokio::test]
async fn 不正なペイロードは送信せずデコード失敗として破棄する(#[case] payload: &str) {
    let relay = Relay::start(MockNotificationSender::new(), 4).await;

    relay.publisher.publish(payload).await;
    relay.drain(1).await;

    assert_eq!(relay.sender.attempts(), 0);
    let letters = relay.dead_letters.letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].stage, FailureStage::Decode);
    assert_eq!(letters[0].payload, payload);
}

#[tokio::test]
async fn 送信失敗後も次のメッセージを処理する() {
    let sender = MockNotificationSender::new();
    sender.fail_next(1);
    let relay = Relay::start(sender, 1).await;

    relay
        .publisher
        .publish(r#"{"email":"first@b.com","code":1}"#)
        .await;
    relay
        .publisher
        .publish(r#"{"email":"second@b.com","code":2}"#)
        .await;
    wait_until(|| relay.finished() >= 2).await;

    assert!(relay.subscriber.is_running().await);
    assert_eq!(relay.sender.attempts(), 2);
    assert_eq!(relay.sender.sent_emails().len(), 1);
    let letters = relay.dead_letters.letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].stage, FailureStage::Send);

    relay.subscriber.shutdown().await;
}

#[tokio::test]
async fn 同じペイロードの再配信は重複送信になる() {
    // メッセージ ID を持たないため重複排除はできない（既知の制約）
    let relay = Relay::start(MockNotificationSender::new(), 4).await;
    let payload = r#"{"email":"a@b.com","code":482913}"#;

    relay.publisher.publish(payload).await;
    relay.publisher.publish(payload).await;
    relay.drain(2).await;

    let sent = relay.sender.sent_emails();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], sent[1]);
}

#[tokio::test]
async fn 同時送信数はmax_in_flightを超えない() {
    let sender = MockNotificationSender::new().with_delay(Duration::from_millis(50));
    let relay = Relay::start(sender, 2).await;

    for code in 0..6 {
        relay
            .publisher
            .publish(format!(r#"{{"email":"a@b.com","code":{code}}}"#))
            .await;
    }
    relay.drain(6).await;

    assert_eq!(relay.sender.sent_emails().len(), 6);
    assert!(
        relay.sender.max_in_flight() <= 2,
        "max_in_flight = {}",
        relay.sender.max_in_flight()
    );
}

#[tokio::test]
async fn shutdownは処理中の送信の完了を待つ() {
    let sender = MockNotificationSender::new().with_delay(Duration::from_millis(200));
    let relay = Relay::start(sender, 4).await;

    relay
        .publisher
        .publish(r#"{"email":"a@b.com","code":1}"#)
        .await;
    wait_until(|| relay.sender.attempts() == 1).await;

    let mut shutdown = tokio_test::task::spawn(relay.subscriber.shutdown());
    assert_pending!(shutdown.poll());
    assert!(relay.sender.sent_emails().is_empty());

    shutdown.await;

    assert_eq!(relay.sender.sent_emails().len(), 1);
    assert!(!relay.subscriber.is_running().await);
}

#[tokio::test]
async fn startを2回呼んでも1通だけ送信する() {
    let relay = Relay::start(MockNotificationSender::new(), 4).await;
    relay.subscriber.start().await.unwrap();

    relay
        .publisher
        .publish(r#"{"email":"a@b.com","code":1}"#)
        .await;
    relay.drain(1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(relay.sender.attempts(), 1);
}
