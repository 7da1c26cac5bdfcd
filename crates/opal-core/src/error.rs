//! Error types for the OPAL engine.
//!
//! A single shared error type covers the whole engine so failures can cross
//! crate boundaries without re-wrapping.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the entire OPAL engine.
///
/// This provides typed, structured error variants with automatic conversion
/// from common error types via the `From` trait.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum OpalError {
    /// The connection is not open; the call was rejected before sending.
    #[error("Not connected to backend")]
    NotConnected,

    /// No response arrived within the configured deadline.
    #[error("Request '{event}' timed out after {timeout_ms}ms")]
    Timeout { event: String, timeout_ms: u64 },

    /// The backend answered with an explicit error event.
    #[error("Remote error for '{event}': {message}")]
    Remote { event: String, message: String },

    /// The cumulative pipeline spend reached the configured ceiling.
    #[error("Budget exceeded: spent {spent:.4} of limit {limit:.4}")]
    BudgetExceeded { spent: f64, limit: f64 },

    /// A pipeline stage failed; the run was halted.
    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Data access error (repository/storage layer)
    #[error("Data access error: {0}")]
    DataAccess(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OpalError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a Timeout error
    pub fn timeout(event: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            event: event.into(),
            timeout_ms,
        }
    }

    /// Creates a Remote error
    pub fn remote(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            event: event.into(),
            message: message.into(),
        }
    }

    /// Creates a BudgetExceeded error
    pub fn budget_exceeded(spent: f64, limit: f64) -> Self {
        Self::BudgetExceeded { spent, limit }
    }

    /// Creates a Stage error
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a DataAccess error
    pub fn data_access(message: impl Into<String>) -> Self {
        Self::DataAccess(message.into())
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a NotConnected error
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected)
    }

    /// Check if this is a Timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if this is a Remote error
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// Check if this is a BudgetExceeded error
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, Self::BudgetExceeded { .. })
    }

    /// Check if this is a Stage error
    pub fn is_stage(&self) -> bool {
        matches!(self, Self::Stage { .. })
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for OpalError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for OpalError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for OpalError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for OpalError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// Conversion from String (for error messages)
impl From<String> for OpalError {
    fn from(err: String) -> Self {
        Self::Internal(err)
    }
}

/// A type alias for `Result<T, OpalError>`.
pub type Result<T> = std::result::Result<T, OpalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = OpalError::timeout("search_prompts", 5000);
        assert_eq!(
            err.to_string(),
            "Request 'search_prompts' timed out after 5000ms"
        );
        assert!(err.is_timeout());
    }

    #[test]
    fn test_budget_exceeded_predicate() {
        let err = OpalError::budget_exceeded(1.25, 1.0);
        assert!(err.is_budget_exceeded());
        assert!(!err.is_stage());
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: OpalError = io.into();
        assert!(matches!(err, OpalError::Io { .. }));
    }
}
