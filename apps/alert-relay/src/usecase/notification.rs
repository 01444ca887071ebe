//! # 通知ユースケース
//!
//! 受信ペイロードから認証コードメールを生成・送信する。
//!
//! ## モジュール構成
//!
//! - [`template_renderer`] - tera テンプレートエンジンによるメール生成
//! - [`dispatcher`] - デコード + レンダリング + 送信 + 失敗時の報告

pub mod dispatcher;
pub mod template_renderer;

pub use dispatcher::{DispatchOutcome, NotificationDispatcher};
pub use template_renderer::TemplateRenderer;
