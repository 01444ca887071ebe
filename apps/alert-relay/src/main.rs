//! # Alert Relay サーバー
//!
//! 認証コード通知のメール中継プロセス。
//!
//! ## 環境変数
//!
//! | 変数名 | 必須 | 説明 |
//! |--------|------|------|
//! | `REDIS_URL` | No | Redis 接続 URL（`REDIS_HOST` / `REDIS_PORT` より優先） |
//! | `REDIS_HOST` | No | Redis ホスト（デフォルト: `localhost`） |
//! | `REDIS_PORT` | No | Redis ポート（デフォルト: `6379`） |
//! | `ALERT_CHANNEL` | No | 購読チャンネル（デフォルト: `alert:email`） |
//! | `DEAD_LETTER_CHANNEL` | No | デッドレターチャンネル（未設定で無効） |
//! | `MAX_IN_FLIGHT` | No | 同時処理数の上限（デフォルト: `16`） |
//! | `NOTIFICATION_BACKEND` | No | `smtp` / `noop`（デフォルト: `smtp`） |
//! | `SMTP_HOST` / `SMTP_PORT` | No | SMTP サーバー（デフォルト: `localhost:1025`） |
//! | `LOG_FORMAT` | No | `json` / `pretty` / `compact`（デフォルト: `pretty`） |
//!
//! ## 起動方法
//!
//! ```bash
//! # 開発環境（Mailpit + Redis）
//! cargo run -p alert-relay
//!
//! # 本番環境
//! REDIS_URL=redis://... SMTP_HOST=... SMTP_SECURITY=starttls cargo run -p alert-relay --release
//! ```

use std::sync::Arc;

use alert_relay::{
    config::{NotificationBackend, RelayConfig},
    subscriber::ChannelSubscriber,
    usecase::{NotificationDispatcher, TemplateRenderer},
};
use alert_relay_infra::{
    NoopNotificationSender,
    NotificationSender,
    RedisDeadLetterPublisher,
    RedisPayloadSource,
    SmtpNotificationSender,
    redis,
};
use alert_relay_shared::observability::{TracingConfig, init_tracing};
use anyhow::Context as _;

/// Alert Relay のエントリーポイント
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    // トレーシング初期化
    let tracing_config = TracingConfig::from_env("alert-relay");
    init_tracing(&tracing_config).context("トレーシングの初期化に失敗しました")?;
    let _tracing_guard = tracing::info_span!("app", service = "alert-relay").entered();

    // 設定読み込み
    let config = RelayConfig::from_env().context("設定の読み込みに失敗しました")?;

    tracing::info!(
        channel = %config.channel,
        max_in_flight = config.max_in_flight,
        "Alert Relay を起動します"
    );

    let client = redis::create_client(&config.redis_url).context("Redis URL が不正です")?;

    // 依存コンポーネントを初期化
    let sender: Arc<dyn NotificationSender> = match config.notification.backend {
        NotificationBackend::Smtp => {
            tracing::info!(
                host = %config.notification.smtp.host,
                port = config.notification.smtp.port,
                "SMTP 送信を使用します"
            );
            Arc::new(
                SmtpNotificationSender::new(config.notification.smtp.clone())
                    .context("SMTP 送信の初期化に失敗しました")?,
            )
        }
        NotificationBackend::Noop => {
            tracing::info!("Noop 送信を使用します（メールは送信されません）");
            Arc::new(NoopNotificationSender)
        }
    };

    let template_renderer =
        TemplateRenderer::new().context("テンプレートの初期化に失敗しました")?;
    let mut dispatcher = NotificationDispatcher::new(
        sender,
        template_renderer,
        config.channel.clone(),
        config.notification.subject.clone(),
    );

    if let Some(dead_letter_channel) = &config.dead_letter_channel {
        let conn = redis::create_connection_manager(client.clone())
            .await
            .context("Redis への接続に失敗しました")?;
        dispatcher = dispatcher.with_dead_letters(Arc::new(RedisDeadLetterPublisher::new(
            conn,
            dead_letter_channel.clone(),
        )));
        tracing::info!(channel = %dead_letter_channel, "デッドレターを有効化しました");
    }

    let source = Arc::new(RedisPayloadSource::new(client, config.redis_retry_interval));
    let subscriber = ChannelSubscriber::new(
        config.channel.clone(),
        source,
        Arc::new(dispatcher),
        config.max_in_flight,
    );

    subscriber
        .start()
        .await
        .context("チャンネルの購読に失敗しました")?;

    shutdown_signal().await;
    tracing::info!("シャットダウンを開始します");
    subscriber.shutdown().await;
    tracing::info!("Alert Relay を停止しました");

    Ok(())
}

/// Ctrl+C または SIGTERM を待つ
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C ハンドラの登録に失敗しました");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM ハンドラの登録に失敗しました");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
