//! Session domain model.
//!
//! This module contains the core Session entity that represents one
//! conversation with the optimization backend.

use super::message::Message;
use super::rubric::Rubric;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Represents one conversation session in the engine's domain layer.
///
/// A session contains:
/// - An ordered conversation history, bounded by the configured message limit
/// - An optional template association with its variable bindings
/// - The best prompt produced so far and its quality rubric
/// - A pinned flag that exempts the session from automatic eviction
/// - Timestamps for creation and last update
///
/// This is the "pure" domain model that business logic operates on,
/// independent of any specific storage format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier (UUID format)
    pub id: String,
    /// Human-readable session title
    pub title: String,
    /// Pinned sessions are never auto-evicted and sort first.
    #[serde(default)]
    pub pinned: bool,
    /// Timestamp when the session was created (ISO 8601 format)
    pub created_at: String,
    /// Timestamp when the session was last updated (ISO 8601 format)
    pub updated_at: String,
    /// Template this session was started from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    /// Variable bindings for the template.
    #[serde(default)]
    pub variables: HashMap<String, String>,
    /// The best optimized prompt produced in this session so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_prompt: Option<String>,
    /// Quality rubric for the best prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubric: Option<Rubric>,
    /// Ordered conversation history (oldest first).
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Session {
    /// Creates an empty session with a fresh id and current timestamps.
    pub fn new(title: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            pinned: false,
            created_at: now.clone(),
            updated_at: now,
            template_id: None,
            variables: HashMap::new(),
            best_prompt: None,
            rubric: None,
            messages: Vec::new(),
        }
    }
}
