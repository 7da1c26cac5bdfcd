//! Prompt rubric scoring types.

use serde::{Deserialize, Serialize};

/// A three-axis quality rubric for an optimized prompt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Rubric {
    /// How unambiguous the prompt is.
    pub clarity: f32,
    /// How concrete the prompt's constraints are.
    pub specificity: f32,
    /// How well the prompt preserves the user's intent.
    pub faithfulness: f32,
}

/// One entry in the global rubric history.
///
/// The history is capped; oldest entries are dropped first. Per-session
/// queries return entries newest-first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricHistoryEntry {
    /// The session this rubric snapshot belongs to.
    pub session_id: String,
    /// Timestamp when the rubric was recorded (ISO 8601 format).
    pub timestamp: String,
    /// The recorded rubric values.
    pub rubric: Rubric,
}
