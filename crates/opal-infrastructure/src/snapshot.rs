//! Persisted engine snapshot.
//!
//! Only a bounded slice of engine state survives a process restart: the
//! last-active session id, the most-recently-updated sessions up to a cap,
//! the rubric history, and the engine settings. Transient state (UI
//! selection, loading flags, in-flight calls) is deliberately not persisted.

use opal_core::error::Result;
use opal_core::kv::KeyValueStore;
use opal_core::session::{RubricHistoryEntry, Session};
use opal_core::settings::EngineSettings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Storage key for the snapshot document.
const SNAPSHOT_KEY: &str = "snapshot";

/// Everything that survives a restart, as one serde document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineSnapshot {
    /// Session that was active when the snapshot was taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_session_id: Option<String>,
    /// Most-recently-updated sessions, newest first, up to the persistence
    /// cap.
    #[serde(default)]
    pub sessions: Vec<Session>,
    /// Global rubric history, oldest first.
    #[serde(default)]
    pub rubric_history: Vec<RubricHistoryEntry>,
    /// Engine settings at snapshot time.
    #[serde(default)]
    pub settings: Option<EngineSettings>,
}

/// Reads and writes the engine snapshot through the key-value port.
pub struct SnapshotRepository {
    store: Arc<dyn KeyValueStore>,
}

impl SnapshotRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Persists the snapshot, replacing any previous one.
    pub async fn save(&self, snapshot: &EngineSnapshot) -> Result<()> {
        let document = serde_json::to_string(snapshot)?;
        self.store.set(SNAPSHOT_KEY, &document).await
    }

    /// Loads the persisted snapshot.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(snapshot))`: A snapshot exists
    /// - `Ok(None)`: Fresh start, nothing persisted yet
    pub async fn load(&self) -> Result<Option<EngineSnapshot>> {
        match self.store.get(SNAPSHOT_KEY).await? {
            Some(document) => Ok(Some(serde_json::from_str(&document)?)),
            None => Ok(None),
        }
    }

    /// Deletes the persisted snapshot.
    pub async fn clear(&self) -> Result<()> {
        self.store.remove(SNAPSHOT_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_memory::MemoryKeyValueStore;
    use opal_core::session::{Message, MessageRole, Rubric};

    fn sample_snapshot() -> EngineSnapshot {
        let mut session = Session::new("persisted");
        session.pinned = true;
        session.best_prompt = Some("the best".to_string());
        session.rubric = Some(Rubric {
            clarity: 0.9,
            specificity: 0.8,
            faithfulness: 0.7,
        });
        session
            .messages
            .push(Message::new(MessageRole::User, "hello").with_client_request_id("abc"));

        EngineSnapshot {
            active_session_id: Some(session.id.clone()),
            rubric_history: vec![RubricHistoryEntry {
                session_id: session.id.clone(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                rubric: session.rubric.unwrap(),
            }],
            sessions: vec![session],
            settings: Some(EngineSettings::default()),
        }
    }

    #[tokio::test]
    async fn test_round_trip_preserves_invariant_fields() {
        let repository = SnapshotRepository::new(Arc::new(MemoryKeyValueStore::new()));

        let snapshot = sample_snapshot();
        repository.save(&snapshot).await.unwrap();

        let loaded = repository.load().await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        // The fields downstream invariants depend on survive serialization.
        assert!(loaded.sessions[0].pinned);
        assert_eq!(
            loaded.sessions[0].messages[0].meta.client_request_id.as_deref(),
            Some("abc")
        );
    }

    #[tokio::test]
    async fn test_load_without_snapshot() {
        let repository = SnapshotRepository::new(Arc::new(MemoryKeyValueStore::new()));
        assert_eq!(repository.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear() {
        let repository = SnapshotRepository::new(Arc::new(MemoryKeyValueStore::new()));
        repository.save(&sample_snapshot()).await.unwrap();
        repository.clear().await.unwrap();
        assert_eq!(repository.load().await.unwrap(), None);
    }
}
