//! # ドメインエラー定義
//!
//! 値オブジェクトの生成時に発生するエラーを表現する。

use thiserror::Error;

/// ドメイン層で発生するエラー
///
/// 受信したペイロードがビジネスルールに違反している場合に使用する。
/// 通知処理ではこのエラーを `NotificationError::Decode` に変換し、
/// 送信を行わずにメッセージを破棄する。
#[derive(Debug, Error)]
pub enum DomainError {
    /// 宛先アドレスが空、`@` を含まない、空白を含む、長すぎる
    #[error("バリデーションエラー: {0}")]
    Validation(String),
}
