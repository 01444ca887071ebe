//! # ビジネスイベントログ
//!
//! 通知の送信結果と購読の開始・停止を、集計しやすい構造化ログとして出力する。
//!
//! ```text
//! {"event.kind":"business_event","event.category":"notification",
//!  "event.action":"notification.dropped","event.result":"failure",
//!  "notification.stage":"decode","message.id":"0192..."}
//! ```
//!
//! 送信数・破棄数はこのログを `jq 'select(.["event.kind"] == "business_event")'` で
//! 抽出して数える。
//!
//! ## エラーログのフィールド
//!
//! エラーは `tracing::error!` / `tracing::warn!` に次の 2 フィールドを文字列で付ける。
//!
//! | `error.category` | `error.kind` | 発生箇所 |
//! |---|---|---|
//! | `input` | `decode` | ペイロードの UTF-8 / JSON / アドレス検証 |
//! | `internal` | `template` | テンプレートレンダリング |
//! | `infrastructure` | `mail_transport` | SMTP 送信 |
//! | `infrastructure` | `dead_letter` | デッドレター発行 |
//! | `infrastructure` | `broker` | 購読の切断・再購読 |

/// `event.kind = "business_event"` を付けて info レベルで出力する
///
/// `event.category` / `event.action` / `event.result` には [`event`] の定数を渡す。
#[macro_export]
macro_rules! log_business_event {
    ($($args:tt)*) => {
        ::tracing::info!(
            event.kind = "business_event",
            $($args)*
        )
    };
}

pub mod event {
    pub mod category {
        /// 1 件のメッセージの処理結果
        pub const NOTIFICATION: &str = "notification";
        /// チャンネル購読のライフサイクル
        pub const SUBSCRIPTION: &str = "subscription";
    }

    pub mod action {
        pub const NOTIFICATION_SENT: &str = "notification.sent";
        /// デコード・レンダリング・送信のいずれかで失敗し、再送せずに破棄した
        pub const NOTIFICATION_DROPPED: &str = "notification.dropped";

        pub const SUBSCRIPTION_STARTED: &str = "subscription.started";
        pub const SUBSCRIPTION_STOPPED: &str = "subscription.stopped";
    }

    pub mod result {
        pub const SUCCESS: &str = "success";
        pub const FAILURE: &str = "failure";
    }
}
