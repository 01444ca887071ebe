//! # Observability 基盤
//!
//! トレーシング初期化とログ出力形式の設定を提供する。
//!
//! | 環境変数 | 用途 | 未設定時 |
//! |---------|------|---------|
//! | `LOG_FORMAT` | `json` / `pretty` / `compact` | `pretty` |
//! | `RUST_LOG` | ログレベルのフィルタ | `info,{サービス名}=debug` |
//!
//! メッセージ単位のスパン（`message.id`）は JSON モードでは `span` フィールドに出力される。

use std::str::FromStr;

/// ログ出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON 形式（本番環境向け、1 行 1 イベント）
    Json,
    /// 人間が読みやすい形式（開発環境向け）
    #[default]
    Pretty,
    /// 1 行に詰めた形式（コンテナのログビューア向け）
    Compact,
}

/// 不明なログ形式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLogFormat(pub String);

impl FromStr for LogFormat {
    type Err = UnknownLogFormat;

    /// 大文字小文字と前後の空白は区別しない
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            _ => Err(UnknownLogFormat(s.to_string())),
        }
    }
}

impl LogFormat {
    /// 環境変数 `LOG_FORMAT` から読み取る
    ///
    /// 不正な値は stderr に警告を出して既定値にフォールバックする。
    /// トレーシング初期化前に呼ばれるため `tracing` には出力できない。
    pub fn from_env() -> Self {
        Self::from_value(std::env::var("LOG_FORMAT").ok().as_deref())
    }

    fn from_value(value: Option<&str>) -> Self {
        match value.map(str::parse::<Self>) {
            None => Self::default(),
            Some(Ok(format)) => format,
            Some(Err(UnknownLogFormat(other))) => {
                eprintln!("WARNING: unknown LOG_FORMAT={other:?}, falling back to pretty");
                Self::default()
            }
        }
    }
}

/// トレーシング初期化設定
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub service_name:      String,
    pub log_format:        LogFormat,
    /// `RUST_LOG` 未設定時のフィルタ
    pub default_directive: String,
}

impl TracingConfig {
    /// サービス名から既定のフィルタを決める（`alert-relay` → `info,alert_relay=debug`）
    pub fn new(service_name: impl Into<String>, log_format: LogFormat) -> Self {
        let service_name = service_name.into();
        let default_directive = format!("info,{}=debug", service_name.replace('-', "_"));
        Self {
            service_name,
            log_format,
            default_directive,
        }
    }

    pub fn from_env(service_name: impl Into<String>) -> Self {
        Self::new(service_name, LogFormat::from_env())
    }
}

/// トレーシングを初期化する
///
/// `ErrorLayer` を登録するため、`InfraError` が保持する `SpanTrace` には
/// エラー生成時点のスパンが記録される。
///
/// サービス名は呼び出し元で `tracing::info_span!("app", service = "...")` に入ることで
/// 全イベントに付与される。
///
/// グローバル subscriber が既に設定済みの場合はエラーを返す。
#[cfg(feature = "observability")]
pub fn init_tracing(
    config: &TracingConfig,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_subscriber::{Layer as _, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_directive));

    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(tracing_error::ErrorLayer::default())
        .try_init()
}
