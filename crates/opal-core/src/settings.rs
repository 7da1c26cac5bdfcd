//! Engine-wide configuration.
//!
//! Settings are serde-backed so they can round-trip through the persisted
//! snapshot and the on-disk `config.toml`.

use serde::{Deserialize, Serialize};

/// How session lists are ordered in projections.
///
/// Pinned sessions always sort first regardless of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionSortKey {
    /// Most recently updated first.
    #[default]
    Updated,
    /// Most recently created first.
    Created,
    /// Alphabetical by title.
    Title,
}

/// Engine-wide tunables.
///
/// Every field has a serde default so a partially written config file still
/// deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Maximum cumulative spend for a single pipeline run (USD).
    #[serde(default = "default_budget_limit")]
    pub budget_limit: f64,
    /// Default retry count carried in stage settings (executor-side concern).
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Default per-call timeout in minutes for long-running stages.
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u32,
    /// Maximum number of messages kept per session (oldest trimmed first).
    #[serde(default = "default_message_limit")]
    pub message_limit: usize,
    /// Maximum number of live sessions (pinned sessions are exempt).
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Maximum number of entries in the global rubric history.
    #[serde(default = "default_rubric_history_limit")]
    pub rubric_history_limit: usize,
    /// Preferred session sort order.
    #[serde(default)]
    pub sort_key: SessionSortKey,
    /// Session list filter query remembered across restarts.
    #[serde(default)]
    pub filter_query: String,
    /// Reserved for future use. Stage execution is sequential regardless of
    /// this flag.
    #[serde(default)]
    pub enable_parallel: bool,
}

fn default_budget_limit() -> f64 {
    1.0
}

fn default_retry_count() -> u32 {
    2
}

fn default_timeout_minutes() -> u32 {
    5
}

fn default_message_limit() -> usize {
    200
}

fn default_max_sessions() -> usize {
    50
}

fn default_rubric_history_limit() -> usize {
    100
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            budget_limit: default_budget_limit(),
            retry_count: default_retry_count(),
            timeout_minutes: default_timeout_minutes(),
            message_limit: default_message_limit(),
            max_sessions: default_max_sessions(),
            rubric_history_limit: default_rubric_history_limit(),
            sort_key: SessionSortKey::default(),
            filter_query: String::new(),
            enable_parallel: false,
        }
    }
}
