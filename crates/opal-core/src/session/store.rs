//! Bounded, deduplicated session store.
//!
//! The store is the single owner of the in-memory session map. All mutation
//! goes through its methods; no other component reaches into the map
//! directly. Bounds:
//!
//! - per session: at most `message_limit` messages (oldest trimmed first)
//! - globally: at most `max_sessions` live sessions; pinned sessions are
//!   exempt, unpinned sessions are evicted least-recently-updated first
//! - rubric history: a single capped list across all sessions

use super::message::Message;
use super::model::Session;
use super::rubric::{Rubric, RubricHistoryEntry};
use crate::error::{OpalError, Result};
use crate::settings::SessionSortKey;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Manages all live sessions and their lifecycle.
///
/// `SessionStore` is responsible for:
/// - Creating and deleting sessions
/// - Appending messages with per-session trimming
/// - Enforcing the global session bound with pinned-exempt eviction
/// - Recording rubric updates into the capped global history
/// - Pure filter/sort projections for list views
pub struct SessionStore {
    /// In-memory session map, keyed by session id.
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    /// Currently active session id, if any.
    active_session_id: Arc<RwLock<Option<String>>>,
    /// Global rubric history, oldest first.
    rubric_history: Arc<RwLock<VecDeque<RubricHistoryEntry>>>,
    message_limit: usize,
    max_sessions: usize,
    rubric_history_limit: usize,
}

impl SessionStore {
    /// Creates an empty store with the given bounds.
    pub fn new(message_limit: usize, max_sessions: usize, rubric_history_limit: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            active_session_id: Arc::new(RwLock::new(None)),
            rubric_history: Arc::new(RwLock::new(VecDeque::new())),
            message_limit,
            max_sessions,
            rubric_history_limit,
        }
    }

    /// Creates a new session, makes it active, and trims the global
    /// population if `max_sessions` is now exceeded.
    pub async fn create_session(&self, title: impl Into<String>) -> Session {
        let session = Session::new(title);

        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session.clone());
        Self::trim_sessions(&mut sessions, self.max_sessions);
        drop(sessions);

        *self.active_session_id.write().await = Some(session.id.clone());

        tracing::debug!(session_id = %session.id, "created session");
        session
    }

    /// Returns a clone of the session with the given id.
    pub async fn get_session(&self, session_id: &str) -> Option<Session> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).cloned()
    }

    /// Returns the number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns the currently active session id.
    pub async fn active_session_id(&self) -> Option<String> {
        self.active_session_id.read().await.clone()
    }

    /// Makes an existing session the active one.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no session with that id exists.
    pub async fn set_active_session(&self, session_id: &str) -> Result<()> {
        let sessions = self.sessions.read().await;
        if !sessions.contains_key(session_id) {
            return Err(OpalError::not_found("session", session_id));
        }
        drop(sessions);

        *self.active_session_id.write().await = Some(session_id.to_string());
        Ok(())
    }

    /// Appends a message to a session, bumps its `updated_at`, and trims the
    /// history to the most recent `message_limit` messages.
    ///
    /// Callers that want idempotent submission must check
    /// [`is_duplicate_request`](Self::is_duplicate_request) first; the store
    /// does not intercept duplicates itself.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no session with that id exists.
    pub async fn add_message(&self, session_id: &str, message: Message) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| OpalError::not_found("session", session_id))?;

        session.messages.push(message);
        if session.messages.len() > self.message_limit {
            let excess = session.messages.len() - self.message_limit;
            session.messages.drain(..excess);
        }
        session.updated_at = chrono::Utc::now().to_rfc3339();

        Ok(())
    }

    /// Checks whether a client request id was already applied to a session.
    ///
    /// Dedup is advisory: callers check this before `add_message`.
    pub async fn is_duplicate_request(&self, session_id: &str, client_request_id: &str) -> bool {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|session| {
                session
                    .messages
                    .iter()
                    .any(|m| m.meta.client_request_id.as_deref() == Some(client_request_id))
            })
            .unwrap_or(false)
    }

    /// Writes the session's current rubric and appends a snapshot to the
    /// capped global rubric history.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no session with that id exists.
    pub async fn update_rubric(&self, session_id: &str, rubric: Rubric) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| OpalError::not_found("session", session_id))?;

        session.rubric = Some(rubric);
        session.updated_at = chrono::Utc::now().to_rfc3339();
        drop(sessions);

        let mut history = self.rubric_history.write().await;
        history.push_back(RubricHistoryEntry {
            session_id: session_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            rubric,
        });
        while history.len() > self.rubric_history_limit {
            history.pop_front();
        }

        Ok(())
    }

    /// Returns rubric history entries for a session, newest first.
    pub async fn rubric_history_for(&self, session_id: &str) -> Vec<RubricHistoryEntry> {
        let history = self.rubric_history.read().await;
        history
            .iter()
            .rev()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect()
    }

    /// Records the best prompt produced so far for a session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no session with that id exists.
    pub async fn set_best_prompt(&self, session_id: &str, prompt: impl Into<String>) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| OpalError::not_found("session", session_id))?;

        session.best_prompt = Some(prompt.into());
        session.updated_at = chrono::Utc::now().to_rfc3339();
        Ok(())
    }

    /// Toggles the pinned flag of a session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no session with that id exists.
    pub async fn toggle_pinned(&self, session_id: &str) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| OpalError::not_found("session", session_id))?;

        session.pinned = !session.pinned;
        session.updated_at = chrono::Utc::now().to_rfc3339();
        Ok(session.pinned)
    }

    /// Renames a session by updating its title.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no session with that id exists.
    pub async fn rename_session(&self, session_id: &str, new_title: impl Into<String>) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| OpalError::not_found("session", session_id))?;

        session.title = new_title.into();
        session.updated_at = chrono::Utc::now().to_rfc3339();
        Ok(())
    }

    /// Deletes a session. Clears the active id if it pointed here.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
        drop(sessions);

        let mut active = self.active_session_id.write().await;
        if active.as_deref() == Some(session_id) {
            *active = None;
        }
        Ok(())
    }

    /// Returns sessions whose title or message content matches `query`
    /// (case-insensitive). Pure projection; no side effects.
    pub async fn filtered_sessions(&self, query: &str) -> Vec<Session> {
        let needle = query.trim().to_lowercase();
        let sessions = self.sessions.read().await;
        let mut matched: Vec<Session> = sessions
            .values()
            .filter(|s| {
                needle.is_empty()
                    || s.title.to_lowercase().contains(&needle)
                    || s.messages
                        .iter()
                        .any(|m| m.content.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        drop(sessions);

        Self::sort_sessions(&mut matched, SessionSortKey::Updated);
        matched
    }

    /// Returns all sessions ordered by `key`, pinned first. Pure projection.
    pub async fn sorted_sessions(&self, key: SessionSortKey) -> Vec<Session> {
        let sessions = self.sessions.read().await;
        let mut all: Vec<Session> = sessions.values().cloned().collect();
        drop(sessions);

        Self::sort_sessions(&mut all, key);
        all
    }

    /// Returns the `cap` most-recently-updated sessions for persistence.
    pub async fn snapshot_sessions(&self, cap: usize) -> Vec<Session> {
        let mut all = self.sorted_sessions(SessionSortKey::Updated).await;
        // Snapshot order is purely recency; pinning only affects eviction
        // and display.
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        all.truncate(cap);
        all
    }

    /// Replaces store contents from a restored snapshot.
    pub async fn load(
        &self,
        restored: Vec<Session>,
        active_session_id: Option<String>,
        rubric_history: Vec<RubricHistoryEntry>,
    ) {
        let mut sessions = self.sessions.write().await;
        sessions.clear();
        for session in restored {
            sessions.insert(session.id.clone(), session);
        }
        Self::trim_sessions(&mut sessions, self.max_sessions);
        let active =
            active_session_id.filter(|id| sessions.contains_key(id));
        drop(sessions);

        *self.active_session_id.write().await = active;

        let mut history = self.rubric_history.write().await;
        history.clear();
        history.extend(rubric_history);
        while history.len() > self.rubric_history_limit {
            history.pop_front();
        }
    }

    /// Returns the full rubric history, oldest first, for persistence.
    pub async fn rubric_history(&self) -> Vec<RubricHistoryEntry> {
        self.rubric_history.read().await.iter().cloned().collect()
    }

    /// Evicts unpinned sessions, least-recently-updated first, until the
    /// population fits `max_sessions`. Pinned sessions are never evicted,
    /// so a fully pinned over-limit population is left alone.
    fn trim_sessions(sessions: &mut HashMap<String, Session>, max_sessions: usize) {
        while sessions.len() > max_sessions {
            let oldest_unpinned = sessions
                .values()
                .filter(|s| !s.pinned)
                .min_by(|a, b| a.updated_at.cmp(&b.updated_at))
                .map(|s| s.id.clone());

            match oldest_unpinned {
                Some(id) => {
                    tracing::debug!(session_id = %id, "evicting session over max_sessions");
                    sessions.remove(&id);
                }
                None => break,
            }
        }
    }

    fn sort_sessions(sessions: &mut [Session], key: SessionSortKey) {
        sessions.sort_by(|a, b| {
            b.pinned.cmp(&a.pinned).then_with(|| match key {
                SessionSortKey::Updated => b.updated_at.cmp(&a.updated_at),
                SessionSortKey::Created => b.created_at.cmp(&a.created_at),
                SessionSortKey::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            })
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::message::MessageRole;

    fn store() -> SessionStore {
        SessionStore::new(5, 3, 10)
    }

    #[tokio::test]
    async fn test_message_limit_keeps_most_recent_tail() {
        let store = store();
        let session = store.create_session("trim me").await;

        for i in 0..12 {
            store
                .add_message(&session.id, Message::new(MessageRole::User, format!("m{}", i)))
                .await
                .unwrap();
        }

        let session = store.get_session(&session.id).await.unwrap();
        assert_eq!(session.messages.len(), 5);
        let contents: Vec<&str> = session.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m7", "m8", "m9", "m10", "m11"]);
    }

    #[tokio::test]
    async fn test_eviction_spares_pinned_sessions() {
        let store = store();
        let pinned = store.create_session("pinned").await;
        store.toggle_pinned(&pinned.id).await.unwrap();

        let mut unpinned_ids = Vec::new();
        for i in 0..4 {
            // Distinct updated_at values so LRU order is deterministic.
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            let s = store.create_session(format!("s{}", i)).await;
            unpinned_ids.push(s.id);
        }

        assert_eq!(store.session_count().await, 3);
        assert!(store.get_session(&pinned.id).await.is_some());
        // The oldest two unpinned sessions were evicted.
        assert!(store.get_session(&unpinned_ids[0]).await.is_none());
        assert!(store.get_session(&unpinned_ids[1]).await.is_none());
        assert!(store.get_session(&unpinned_ids[2]).await.is_some());
        assert!(store.get_session(&unpinned_ids[3]).await.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_request_detection() {
        let store = store();
        let session = store.create_session("dedup").await;

        let request_id = "abc";
        assert!(!store.is_duplicate_request(&session.id, request_id).await);

        let message =
            Message::new(MessageRole::User, "Write a haiku").with_client_request_id(request_id);
        store.add_message(&session.id, message).await.unwrap();

        // Second submission with the same id: caller checks, sees the dup,
        // and does not append.
        assert!(store.is_duplicate_request(&session.id, request_id).await);

        let session = store.get_session(&session.id).await.unwrap();
        let dupes = session
            .messages
            .iter()
            .filter(|m| m.meta.client_request_id.as_deref() == Some(request_id))
            .count();
        assert_eq!(dupes, 1);
    }

    #[tokio::test]
    async fn test_rubric_history_is_capped_and_newest_first() {
        let store = SessionStore::new(5, 3, 4);
        let session = store.create_session("rubrics").await;

        for i in 0..6 {
            store
                .update_rubric(
                    &session.id,
                    Rubric {
                        clarity: i as f32,
                        specificity: 0.0,
                        faithfulness: 0.0,
                    },
                )
                .await
                .unwrap();
        }

        let history = store.rubric_history_for(&session.id).await;
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].rubric.clarity, 5.0);
        assert_eq!(history[3].rubric.clarity, 2.0);
    }

    #[tokio::test]
    async fn test_sorted_sessions_pins_first() {
        let store = store();
        let a = store.create_session("alpha").await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let _b = store.create_session("beta").await;
        store.toggle_pinned(&a.id).await.unwrap();

        let sorted = store.sorted_sessions(SessionSortKey::Title).await;
        assert_eq!(sorted[0].id, a.id);
    }

    #[tokio::test]
    async fn test_filtered_sessions_matches_message_content() {
        let store = store();
        let session = store.create_session("plain title").await;
        store
            .add_message(&session.id, Message::new(MessageRole::User, "Write a haiku"))
            .await
            .unwrap();
        store.create_session("other").await;

        let found = store.filtered_sessions("HAIKU").await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, session.id);
    }

    #[tokio::test]
    async fn test_delete_session_clears_active() {
        let store = store();
        let session = store.create_session("bye").await;
        assert_eq!(store.active_session_id().await, Some(session.id.clone()));

        store.delete_session(&session.id).await.unwrap();
        assert_eq!(store.active_session_id().await, None);
    }

    #[tokio::test]
    async fn test_add_message_to_missing_session() {
        let store = store();
        let err = store
            .add_message("nope", Message::new(MessageRole::User, "hi"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
