//! Pipeline result types.

use super::stage::StageType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which bucket a pipeline result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultBucket {
    /// The current best candidate prompt.
    Best,
    /// Alternative phrasings produced by expand/constrain stages.
    Variant,
    /// Critiques produced by evaluate stages.
    Critique,
    /// Head-to-head comparisons produced by compare stages.
    Comparison,
}

impl ResultBucket {
    /// The bucket a stage's output routes into. Compare stages additionally
    /// copy their result into the Best bucket.
    pub fn for_stage_type(stage_type: StageType) -> Self {
        match stage_type {
            StageType::Expand | StageType::Constrain => Self::Variant,
            StageType::Evaluate => Self::Critique,
            StageType::Compare => Self::Comparison,
        }
    }
}

/// One result produced by a pipeline run.
///
/// Results are owned by the run until the caller promotes them to a
/// long-lived collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Unique result identifier (UUID format).
    pub id: String,
    /// Which bucket this result belongs to.
    pub bucket: ResultBucket,
    /// The result text.
    pub content: String,
    /// Optional quality score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    /// Free-form metadata (producing stage, model, etc.).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Timestamp when the result was created (ISO 8601 format).
    pub created_at: String,
}

impl StageResult {
    /// Creates a result in the given bucket with a fresh id.
    pub fn new(bucket: ResultBucket, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            bucket,
            content: content.into(),
            score: None,
            metadata: HashMap::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
