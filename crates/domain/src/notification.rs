//! # 通知
//!
//! 認証コードメール通知に関するドメインモデルを定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 説明 |
//! |---|------------|------|
//! | [`NotificationRequest`] | 通知リクエスト | チャンネルから受信したペイロードをデコードしたもの |
//! | [`EmailMessage`] | メールメッセージ | テンプレートレンダリングの出力 |
//! | [`DeadLetter`] | デッドレター | 処理に失敗したメッセージの記録 |
//!
//! ## 設計方針
//!
//! - **完全な形でのみ生成**: `NotificationRequest` は宛先とコードの両方が検証済みの
//!   状態でしか存在しない。不正なペイロードは送信処理に到達しない
//! - **fire-and-forget**: 失敗はメッセージ単位で完結し、呼び出し元に伝播しない
//! - **冪等性キーなし**: ペイロードにメッセージ ID が含まれないため重複排除は行わない
//!
//! ## ワイヤーフォーマット
//!
//! ```json
//! {"email": "user@example.com", "code": 482913}
//! ```
//!
//! 未知のフィールドは無視する。

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use validator::ValidateEmail;
use strum::IntoStaticStr;
use thiserror::Error;
use uuid::Uuid;

use crate::DomainError;

/// メールアドレスの最大長
const EMAIL_MAX_LENGTH: usize = 255;

/// 通知処理のエラー
///
/// いずれのバリアントもメッセージ単位で終端し、購読ループには伝播しない。
#[derive(Debug, Error)]
pub enum NotificationError {
    /// ペイロードのデコードに失敗（UTF-8 / JSON / フィールド欠落・型不一致・検証失敗）
    #[error("ペイロードのデコードに失敗: {0}")]
    Decode(String),

    /// テンプレートレンダリングに失敗
    #[error("テンプレートレンダリングに失敗: {0}")]
    TemplateFailed(String),

    /// メール送信に失敗
    #[error("メール送信に失敗: {0}")]
    SendFailed(String),
}

impl NotificationError {
    /// エラーが発生した処理段階を返す
    pub fn stage(&self) -> FailureStage {
        match self {
            Self::Decode(_) => FailureStage::Decode,
            Self::TemplateFailed(_) => FailureStage::Render,
            Self::SendFailed(_) => FailureStage::Send,
        }
    }
}

impl From<DomainError> for NotificationError {
    fn from(e: DomainError) -> Self {
        Self::Decode(e.to_string())
    }
}

/// 処理段階
///
/// デッドレターの `stage` フィールドに snake_case で格納される。
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureStage {
    /// ペイロードのデコード
    Decode,
    /// 本文のレンダリング
    Render,
    /// メール送信
    Send,
}

/// メッセージ ID
///
/// 受信時にリレー側で採番する UUID v7。ログの相関とデッドレターの識別に使う。
/// ブローカーが付与する ID ではないため、再配信の検出には使えない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

/// メールアドレス（値オブジェクト）
///
/// 生成時にバリデーションを実行し、不正な値の作成を防ぐ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct Email(String);

impl Email {
    /// メールアドレスを作成する
    ///
    /// # バリデーション
    ///
    /// - 空文字列ではない
    /// - 最大 255 文字
    /// - `local@domain` の単一アドレス（HTML5 の email 入力と同じ規則）
    ///
    /// `@` が 2 つ以上あるもの、区切り文字（`,` `;` `<` `>` `"`）や空白・制御文字を
    /// 含むものは拒否する。SMTP の宛先ヘッダーに複数アドレスとして解釈されうるため。
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();

        if value.is_empty() {
            return Err(DomainError::Validation(
                "メールアドレスは必須です".to_string(),
            ));
        }

        if value.len() > EMAIL_MAX_LENGTH {
            return Err(DomainError::Validation(format!(
                "メールアドレスは{EMAIL_MAX_LENGTH}文字以内である必要があります"
            )));
        }

        if !value.validate_email() {
            return Err(DomainError::Validation(format!(
                "メールアドレスの形式が不正です: {}",
                value.escape_debug()
            )));
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `@` より後ろのドメイン部分
    ///
    /// ログには宛先全体ではなくこちらを出す。
    pub fn domain(&self) -> &str {
        self.0.rsplit_once('@').map_or("", |(_, domain)| domain)
    }
}

/// 認証コード（値オブジェクト）
///
/// 非負の整数。テンプレートには 10 進表記のまま埋め込む（ゼロ埋めしない）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(transparent)]
#[display("{_0}")]
pub struct VerificationCode(u32);

impl VerificationCode {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

/// 受信ペイロードの JSON 表現
#[derive(Debug, Deserialize)]
struct WirePayload {
    email: String,
    code:  VerificationCode,
}

/// 通知リクエスト
///
/// チャンネルから受信した 1 件のペイロードに対応する。永続化されず、
/// ディスパッチャーに一度だけ消費される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    recipient: Email,
    code:      VerificationCode,
}

impl NotificationRequest {
    pub fn new(recipient: Email, code: VerificationCode) -> Self {
        Self { recipient, code }
    }

    /// 生のペイロードバイト列からリクエストをデコードする
    ///
    /// UTF-8 として解釈した後、JSON としてパースし、宛先を検証する。
    /// いずれかの段階で失敗した場合は [`NotificationError::Decode`] を返す。
    pub fn from_payload(payload: &[u8]) -> Result<Self, NotificationError> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| NotificationError::Decode(format!("UTF-8 として不正: {e}")))?;

        let wire: WirePayload = serde_json::from_str(text)
            .map_err(|e| NotificationError::Decode(format!("JSON として不正: {e}")))?;

        let recipient = Email::new(wire.email)?;

        Ok(Self::new(recipient, wire.code))
    }

    pub fn recipient(&self) -> &Email {
        &self.recipient
    }

    pub fn code(&self) -> VerificationCode {
        self.code
    }
}

/// メールメッセージ
///
/// テンプレートレンダリングの出力。NotificationSender に渡される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// 送信先メールアドレス
    pub to:        String,
    /// 件名
    pub subject:   String,
    /// HTML 本文（`text/html` パートとして送信する）
    pub html_body: String,
    /// プレーンテキスト本文
    pub text_body: String,
}

/// デッドレター
///
/// 処理に失敗したメッセージを後から調査・再投入できるよう、
/// デッドレターチャンネルに JSON で発行する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub message_id: MessageId,
    /// 受信元チャンネル
    pub channel:    String,
    /// 受信ペイロード（不正な UTF-8 は置換文字に変換）
    pub payload:    String,
    pub stage:      FailureStage,
    pub error:      String,
    pub failed_at:  DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(
        message_id: MessageId,
        channel: impl Into<String>,
        payload: &[u8],
        error: &NotificationError,
        failed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id,
            channel: channel.into(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            stage: error.stage(),
            error: error.to_string(),
            failed_at,
        }
    }
}
