//! # ユースケース層
//!
//! ドメインとインフラを組み合わせてアプリケーション固有の処理を実装する。

pub mod notification;

pub use notification::{DispatchOutcome, NotificationDispatcher, TemplateRenderer};
