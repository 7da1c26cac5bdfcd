//! Engine facade.
//!
//! Ties the session store, the correlated backend calls, the pipeline
//! orchestrator, and snapshot persistence together behind one service.
//! Resolutions arriving after their session was deleted are dropped here;
//! the store itself never sees them.

use crate::pipeline::{PipelineOrchestrator, RunSnapshot};
use async_trait::async_trait;
use opal_core::error::{OpalError, Result};
use opal_core::pipeline::{ResultBucket, Stage};
use opal_core::session::{Message, MessageRole, Rubric, Session, SessionStore};
use opal_core::settings::EngineSettings;
use opal_infrastructure::{EngineSnapshot, SnapshotRepository};
use opal_transport::{RequestBroker, events};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// The correlated optimize call, behind a trait so service logic is
/// testable without a live socket.
#[async_trait]
pub trait PromptBackend: Send + Sync {
    /// Optimizes a prompt and returns the raw response payload.
    async fn optimize(&self, prompt: &str) -> Result<Value>;
}

/// Production backend over the request broker.
pub struct BrokerPromptBackend {
    broker: Arc<RequestBroker>,
    call_timeout: Duration,
}

impl BrokerPromptBackend {
    pub fn new(broker: Arc<RequestBroker>, call_timeout: Duration) -> Self {
        Self {
            broker,
            call_timeout,
        }
    }
}

#[async_trait]
impl PromptBackend for BrokerPromptBackend {
    async fn optimize(&self, prompt: &str) -> Result<Value> {
        self.broker
            .call(
                events::OPTIMIZE_PROMPT,
                json!({ "prompt": prompt }),
                self.call_timeout,
            )
            .await
    }
}

/// Outcome of a prompt submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The backend's reply, already appended to the session.
    Replied(Message),
    /// The client request id was already applied; nothing was appended.
    Duplicate,
}

/// Client-facing engine operations.
pub struct EngineService {
    store: Arc<SessionStore>,
    backend: Arc<dyn PromptBackend>,
    orchestrator: Arc<PipelineOrchestrator>,
    snapshots: Arc<SnapshotRepository>,
    settings: RwLock<EngineSettings>,
}

impl EngineService {
    pub fn new(
        store: Arc<SessionStore>,
        backend: Arc<dyn PromptBackend>,
        orchestrator: Arc<PipelineOrchestrator>,
        snapshots: Arc<SnapshotRepository>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            backend,
            orchestrator,
            snapshots,
            settings: RwLock::new(settings),
        }
    }

    pub async fn settings(&self) -> EngineSettings {
        self.settings.read().await.clone()
    }

    pub async fn update_settings(&self, settings: EngineSettings) {
        *self.settings.write().await = settings;
    }

    /// Creates a session and makes it active.
    pub async fn create_session(&self, title: impl Into<String>) -> Session {
        self.store.create_session(title).await
    }

    /// Submits a user prompt to a session and appends the backend's reply.
    ///
    /// When `client_request_id` is given and was already applied to this
    /// session, the submission is dropped without a backend call. A reply
    /// that arrives after the session was deleted mid-flight is discarded.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the session does not exist (including
    /// deletion mid-flight), plus any backend call failure.
    pub async fn submit_prompt(
        &self,
        session_id: &str,
        content: &str,
        client_request_id: Option<&str>,
    ) -> Result<SubmitOutcome> {
        if self.store.get_session(session_id).await.is_none() {
            return Err(OpalError::not_found("session", session_id));
        }
        if let Some(request_id) = client_request_id {
            if self.store.is_duplicate_request(session_id, request_id).await {
                tracing::debug!(session_id, request_id, "dropping duplicate submission");
                return Ok(SubmitOutcome::Duplicate);
            }
        }

        let mut user_message = Message::new(MessageRole::User, content);
        if let Some(request_id) = client_request_id {
            user_message = user_message.with_client_request_id(request_id);
        }
        self.store.add_message(session_id, user_message).await?;

        let started = Instant::now();
        let payload = self.backend.optimize(content).await?;

        // The session may have been deleted while the call was in flight.
        if self.store.get_session(session_id).await.is_none() {
            tracing::debug!(session_id, "discarding reply for deleted session");
            return Err(OpalError::not_found("session", session_id));
        }

        let text = payload
            .get("optimized_prompt")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut reply = Message::new(MessageRole::Model, text);
        reply.meta.latency_ms = Some(started.elapsed().as_millis() as u64);
        reply.meta.variant = payload
            .get("variant")
            .and_then(Value::as_str)
            .map(str::to_string);
        reply.meta.tokens = payload
            .get("tokens")
            .and_then(Value::as_u64)
            .map(|t| t as u32);

        self.store.add_message(session_id, reply.clone()).await?;
        Ok(SubmitOutcome::Replied(reply))
    }

    /// Runs an optimization pipeline for a session.
    ///
    /// The initial prompt is the session's best prompt if one exists,
    /// otherwise its most recent user message. On completion a Best-bucket
    /// result is promoted into the session's `best_prompt`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing session or one with nothing to
    /// optimize; run halts (`BudgetExceeded`, `Stage`) propagate.
    pub async fn run_pipeline(&self, session_id: &str, stages: Vec<Stage>) -> Result<RunSnapshot> {
        let session = self
            .store
            .get_session(session_id)
            .await
            .ok_or_else(|| OpalError::not_found("session", session_id))?;

        let prompt = session.best_prompt.clone().or_else(|| {
            session
                .messages
                .iter()
                .rev()
                .find(|m| m.role == MessageRole::User)
                .map(|m| m.content.clone())
        });
        let Some(prompt) = prompt else {
            return Err(OpalError::not_found("prompt for session", session_id));
        };

        self.orchestrator.load(prompt, stages).await;
        let run = self.orchestrator.run().await;
        let snapshot = self.orchestrator.progress().await;

        if let Some(best) = snapshot
            .results
            .get(&ResultBucket::Best)
            .and_then(|results| results.last())
        {
            // Best-effort promotion; the session may be gone by now.
            if self.store.get_session(session_id).await.is_some() {
                self.store
                    .set_best_prompt(session_id, &best.content)
                    .await?;
            }
        }

        run?;
        Ok(snapshot)
    }

    /// Records a rubric score for a session.
    pub async fn update_rubric(&self, session_id: &str, rubric: Rubric) -> Result<()> {
        self.store.update_rubric(session_id, rubric).await
    }

    /// Persists the restartable engine state.
    pub async fn save_snapshot(&self) -> Result<()> {
        let settings = self.settings().await;
        let snapshot = EngineSnapshot {
            active_session_id: self.store.active_session_id().await,
            sessions: self.store.snapshot_sessions(settings.max_sessions).await,
            rubric_history: self.store.rubric_history().await,
            settings: Some(settings),
        };
        self.snapshots.save(&snapshot).await
    }

    /// Restores engine state from the persisted snapshot, if one exists.
    /// Returns whether a snapshot was found.
    pub async fn restore_snapshot(&self) -> Result<bool> {
        let Some(snapshot) = self.snapshots.load().await? else {
            return Ok(false);
        };

        self.store
            .load(
                snapshot.sessions,
                snapshot.active_session_id,
                snapshot.rubric_history,
            )
            .await;
        if let Some(settings) = snapshot.settings {
            self.update_settings(settings).await;
        }
        tracing::info!("restored engine snapshot");
        Ok(true)
    }
}
