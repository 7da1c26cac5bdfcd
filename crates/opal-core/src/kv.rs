//! Key-value persistence port.
//!
//! Defines the interface the engine uses for everything that survives a
//! process restart. Implementations live in `opal-infrastructure`
//! (file-backed) and in tests (in-memory).

use crate::error::Result;
use async_trait::async_trait;

/// An abstract key-value store for persisted engine state.
///
/// This trait decouples the engine from the specific storage mechanism
/// (flat files, encrypted storage, a remote service). Values are opaque
/// strings; callers are responsible for serialization.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))`: Key present
    /// - `Ok(None)`: Key absent
    /// - `Err(_)`: Error occurred during retrieval
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}
