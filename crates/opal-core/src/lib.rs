//! Core domain layer of the OPAL engine.
//!
//! This crate holds the domain models (sessions, messages, rubrics, pipeline
//! stages and results), the shared error type, engine settings, and the ports
//! the outer layers implement (key-value persistence, stage execution).
//! It performs no I/O of its own.

pub mod error;
pub mod kv;
pub mod pipeline;
pub mod session;
pub mod settings;

// Re-export common error type
pub use error::{OpalError, Result};
pub use settings::{EngineSettings, SessionSortKey};
