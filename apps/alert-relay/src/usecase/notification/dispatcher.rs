//! # 通知ディスパッチャー
//!
//! 受信ペイロード 1 件に対して デコード → テンプレートレンダリング → メール送信 を行う。
//!
//! ## 設計方針
//!
//! - **fire-and-forget**: `dispatch()` は失敗してもエラーを返さない。結果は
//!   [`DispatchOutcome`] として返すが、購読ループはこれを無視する
//! - **再送しない**: 失敗したメッセージはログ出力（とデッドレター発行）のみで破棄する
//! - **依存性注入**: `NotificationSender` と `DeadLetterPublisher` は trait で抽象化

use std::sync::Arc;

use alert_relay_domain::notification::{
    DeadLetter,
    Email,
    FailureStage,
    MessageId,
    NotificationError,
    NotificationRequest,
};
use alert_relay_infra::{DeadLetterPublisher, NotificationSender};
use alert_relay_shared::{event_log::event, log_business_event};
use async_trait::async_trait;
use chrono::Utc;

use super::TemplateRenderer;
use crate::subscriber::MessageHandler;

/// 1 件のディスパッチ結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// メール送信に成功した
    Sent,
    /// 指定の段階で失敗し、メッセージを破棄した
    Dropped(FailureStage),
}

/// 通知ディスパッチャー
pub struct NotificationDispatcher {
    sender:            Arc<dyn NotificationSender>,
    template_renderer: TemplateRenderer,
    dead_letters:      Option<Arc<dyn DeadLetterPublisher>>,
    channel:           String,
    subject:           String,
}

impl NotificationDispatcher {
    pub fn new(
        sender: Arc<dyn NotificationSender>,
        template_renderer: TemplateRenderer,
        channel: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            sender,
            template_renderer,
            dead_letters: None,
            channel: channel.into(),
            subject: subject.into(),
        }
    }

    /// 失敗したメッセージをデッドレターとして発行する
    pub fn with_dead_letters(mut self, publisher: Arc<dyn DeadLetterPublisher>) -> Self {
        self.dead_letters = Some(publisher);
        self
    }

    /// ペイロード 1 件を処理する（fire-and-forget）
    pub async fn dispatch(&self, message_id: MessageId, payload: &[u8]) -> DispatchOutcome {
        match self.deliver(payload).await {
            Ok(recipient) => {
                log_business_event!(
                    event.category = event::category::NOTIFICATION,
                    event.action = event::action::NOTIFICATION_SENT,
                    event.result = event::result::SUCCESS,
                    message.id = %message_id,
                    notification.recipient_domain = recipient.domain(),
                    "認証コードメール送信成功"
                );
                DispatchOutcome::Sent
            }
            Err(e) => {
                let stage = e.stage();
                self.report_failure(message_id, payload, &e).await;
                DispatchOutcome::Dropped(stage)
            }
        }
    }

    async fn deliver(&self, payload: &[u8]) -> Result<Email, NotificationError> {
        let request = NotificationRequest::from_payload(payload)?;
        let email = self.template_renderer.render(&request, &self.subject)?;
        self.sender.send_email(&email).await?;
        Ok(request.recipient().clone())
    }

    async fn report_failure(&self, message_id: MessageId, payload: &[u8], error: &NotificationError) {
        let stage = error.stage();
        let stage_str: &str = stage.into();

        match stage {
            FailureStage::Decode => tracing::error!(
                error.category = "input",
                error.kind = "decode",
                error = %error,
                payload.len = payload.len(),
                "ペイロードを破棄しました"
            ),
            FailureStage::Render => tracing::error!(
                error.category = "internal",
                error.kind = "template",
                error = %error,
                "テンプレートのレンダリングに失敗しました"
            ),
            FailureStage::Send => tracing::error!(
                error.category = "infrastructure",
                error.kind = "mail_transport",
                error = %error,
                "メール送信に失敗しました"
            ),
        }

        log_business_event!(
            event.category = event::category::NOTIFICATION,
            event.action = event::action::NOTIFICATION_DROPPED,
            event.result = event::result::FAILURE,
            message.id = %message_id,
            notification.stage = stage_str,
            "通知を破棄しました"
        );

        let Some(publisher) = &self.dead_letters else {
            return;
        };

        let letter = DeadLetter::new(message_id, &self.channel, payload, error, Utc::now());
        if let Err(e) = publisher.publish(&letter).await {
            tracing::error!(
                error.category = "infrastructure",
                error.kind = "dead_letter",
                error = %e,
                "デッドレターの発行に失敗しました"
            );
        }
    }
}

#[async_trait]
impl MessageHandler for NotificationDispatcher {
    async fn on_message(&self, message_id: MessageId, payload: &[u8]) {
        self.dispatch(message_id, payload).await;
    }
}
