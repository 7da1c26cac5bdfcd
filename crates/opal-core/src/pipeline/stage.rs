//! Pipeline stage model and the stage-executor port.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What kind of transformation a stage performs.
///
/// The type also determines which result bucket the stage's output is
/// routed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageType {
    /// Generate broader variants of the prompt.
    Expand,
    /// Tighten the prompt against constraints.
    Constrain,
    /// Score the prompt and produce a critique.
    Evaluate,
    /// Compare candidate prompts and pick a winner.
    Compare,
}

/// Lifecycle state of a single stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not yet started.
    #[default]
    Idle,
    /// Currently executing.
    Active,
    /// Finished successfully.
    Completed,
    /// Failed; downstream stages of this run do not execute.
    Errored,
}

/// Per-stage execution settings.
///
/// `retry_count` is carried for stage executors that implement retries;
/// the orchestrator itself never retries a failed stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub retry_count: u32,
    pub timeout_seconds: u32,
    pub model: String,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            retry_count: 2,
            timeout_seconds: 60,
            model: "default".to_string(),
        }
    }
}

/// Token usage reported by a stage execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// One unit of a multi-stage pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Unique stage identifier (UUID format).
    pub id: String,
    /// Human-readable stage name.
    pub name: String,
    /// Transformation kind; determines result routing.
    pub stage_type: StageType,
    /// Position in the run; stages execute in ascending order.
    pub order: u32,
    /// Current lifecycle state.
    #[serde(default)]
    pub status: StageStatus,
    /// Execution settings.
    #[serde(default)]
    pub settings: StageSettings,
    /// Input handed to the executor (set when the stage starts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Output produced by the executor (set on completion).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Error message (set when the stage errors).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Timestamp when execution started (ISO 8601 format).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// Timestamp when execution finished (ISO 8601 format).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Token usage recorded on completion.
    #[serde(default)]
    pub token_usage: TokenUsage,
}

impl Stage {
    /// Creates an idle stage with a fresh id and default settings.
    pub fn new(name: impl Into<String>, stage_type: StageType, order: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            stage_type,
            order,
            status: StageStatus::Idle,
            settings: StageSettings::default(),
            input: None,
            output: None,
            error: None,
            started_at: None,
            completed_at: None,
            token_usage: TokenUsage::default(),
        }
    }
}

/// Result of executing one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    /// The transformed prompt text.
    pub output: String,
    /// Incremental cost of this execution (USD).
    pub cost: f64,
    /// Token usage for this execution.
    pub token_usage: TokenUsage,
}

/// Executes a single pipeline stage.
///
/// The orchestrator is written against this port so a backend-backed
/// executor can be swapped for a mock without touching orchestration logic.
/// Retries, if desired, belong inside the executor (see
/// [`StageSettings::retry_count`]).
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Runs the stage against `input` and returns its output, cost, and
    /// token usage.
    async fn execute(&self, stage: &Stage, input: &str) -> Result<StageOutput>;
}
