//! # テンプレートレンダラー
//!
//! tera テンプレートエンジンで認証コードメールを HTML/plaintext 両形式で生成する。
//!
//! ## 設計方針
//!
//! - **`include_str!` によるコンパイル時埋め込み**: テンプレートはバイナリに埋め込まれる
//! - **コードはそのまま出力**: ゼロ埋めや桁区切りは行わない（`7` は `7` のまま）
//! - **件名は設定値**: `NOTIFICATION_SUBJECT` から受け取る

use alert_relay_domain::notification::{EmailMessage, NotificationError, NotificationRequest};
use tera::{Context, Tera};

const VERIFICATION_CODE: &str = "verification_code";

/// テンプレートレンダラー
///
/// tera テンプレートエンジンをラップし、`NotificationRequest` から
/// `EmailMessage` を生成する。
pub struct TemplateRenderer {
    engine: Tera,
}

impl TemplateRenderer {
    /// 新しいレンダラーインスタンスを作成
    ///
    /// `include_str!` で埋め込んだテンプレートを tera に登録する。
    pub fn new() -> Result<Self, NotificationError> {
        let mut engine = Tera::default();

        engine
            .add_raw_templates(vec![
                (
                    "verification_code.html",
                    include_str!("../../../templates/notifications/verification_code.html"),
                ),
                (
                    "verification_code.txt",
                    include_str!("../../../templates/notifications/verification_code.txt"),
                ),
            ])
            .map_err(|e| NotificationError::TemplateFailed(e.to_string()))?;

        Ok(Self { engine })
    }

    /// 通知リクエストからメールメッセージを生成する
    pub fn render(
        &self,
        request: &NotificationRequest,
        subject: &str,
    ) -> Result<EmailMessage, NotificationError> {
        let mut context = Context::new();
        context.insert("code", &request.code().value());

        let html_body = self
            .engine
            .render(&format!("{VERIFICATION_CODE}.html"), &context)
            .map_err(|e| NotificationError::TemplateFailed(e.to_string()))?;

        let text_body = self
            .engine
            .render(&format!("{VERIFICATION_CODE}.txt"), &context)
            .map_err(|e| NotificationError::TemplateFailed(e.to_string()))?;

        Ok(EmailMessage {
            to: request.recipient().to_string(),
            subject: subject.to_string(),
            html_body,
            text_body,
        })
    }
}
