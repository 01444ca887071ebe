//! # Alert Relay 共有ユーティリティ
//!
//! ワークスペース全体で使用される横断的なユーティリティを提供する。
//!
//! ## 設計方針
//!
//! - 他のすべてのクレート（domain, infra, app）から依存される
//! - ビジネスロジックを含まない純粋なユーティリティのみを配置
//! - トレーシング初期化の依存は `observability` feature の背後に置く

pub mod event_log;
pub mod observability;
