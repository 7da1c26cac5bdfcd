//! Conversation message types.
//!
//! This module contains types for representing messages in a conversation,
//! including roles, content, and optional client metadata.

use serde::{Deserialize, Serialize};

/// Represents the role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Message from the user.
    User,
    /// Message from the optimization model.
    Model,
    /// System-generated message.
    System,
}

/// Optional metadata attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MessageMeta {
    /// Which pipeline variant produced this message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    /// Token count reported by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u32>,
    /// Client-side latency of the producing call in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Caller-generated id used for idempotent submission. Unique within a
    /// session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_request_id: Option<String>,
}

/// A single message in a session's conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier (UUID format).
    pub id: String,
    /// The role of the message sender.
    pub role: MessageRole,
    /// The content of the message.
    pub content: String,
    /// Optional client metadata.
    #[serde(default)]
    pub meta: MessageMeta,
    /// Timestamp when the message was created (ISO 8601 format).
    pub created_at: String,
}

impl Message {
    /// Creates a message with a fresh id and the current timestamp.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            meta: MessageMeta::default(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Attaches a client request id for idempotent submission.
    pub fn with_client_request_id(mut self, client_request_id: impl Into<String>) -> Self {
        self.meta.client_request_id = Some(client_request_id.into());
        self
    }
}
