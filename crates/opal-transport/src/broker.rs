//! Request correlation layer.
//!
//! Turns "emit event X, wait for event Y" into a single awaitable call.
//! Every request carries an explicit correlation id and is resolved exactly
//! once by whichever of {success event, error event, timeout} happens first;
//! the pending entry is removed on every path, so late responses are no-ops
//! and nothing leaks.

use crate::connection::{ConnectionManager, ConnectionState};
use crate::wire::{self, Frame};
use opal_core::error::{OpalError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};

/// One in-flight correlated call.
struct PendingRequest {
    resolve: oneshot::Sender<Result<Value>>,
    success_event: &'static str,
    error_event: &'static str,
}

/// Correlates request frames with their response frames.
///
/// Also re-broadcasts uncorrelated push events (`typing_indicator`,
/// `suggestion_update`) to subscribers.
pub struct RequestBroker {
    connection: Arc<ConnectionManager>,
    pending: Arc<Mutex<HashMap<String, PendingRequest>>>,
    push_events: broadcast::Sender<Frame>,
}

impl RequestBroker {
    /// Creates a broker over the manager's inbound frame stream and spawns
    /// the dispatch task.
    pub fn new(connection: Arc<ConnectionManager>, inbound: mpsc::Receiver<Frame>) -> Self {
        let pending = Arc::new(Mutex::new(HashMap::new()));
        let (push_events, _) = broadcast::channel(64);

        tokio::spawn(dispatch(inbound, pending.clone(), push_events.clone()));

        Self {
            connection,
            pending,
            push_events,
        }
    }

    /// Subscribes to uncorrelated push events.
    pub fn subscribe_push(&self) -> broadcast::Receiver<Frame> {
        self.push_events.subscribe()
    }

    /// Issues one correlated call and awaits its resolution.
    ///
    /// Rejects immediately when the connection is not Connected. Otherwise
    /// the call resolves within `timeout` even if the connection drops
    /// mid-flight: bounded wait is a hard guarantee.
    ///
    /// # Errors
    ///
    /// - `NotConnected`: connection was not open when the call was issued
    /// - `Timeout`: no matching response within `timeout`
    /// - `Remote`: the backend answered with the paired error event
    pub async fn call(&self, event: &str, payload: Value, timeout: Duration) -> Result<Value> {
        if self.connection.state().await != ConnectionState::Connected {
            return Err(OpalError::NotConnected);
        }
        let (success_event, error_event) = wire::response_events(event)
            .ok_or_else(|| OpalError::internal(format!("no response events for '{}'", event)))?;

        let correlation_id = uuid::Uuid::new_v4().to_string();
        let (resolve, resolved) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                correlation_id.clone(),
                PendingRequest {
                    resolve,
                    success_event,
                    error_event,
                },
            );
        }

        let frame = Frame::request(event, correlation_id.clone(), payload);
        if let Err(e) = self.connection.send(frame).await {
            self.pending.lock().await.remove(&correlation_id);
            return Err(e);
        }

        let started = Instant::now();
        let outcome = tokio::select! {
            resolution = resolved => match resolution {
                Ok(result) => result,
                // The dispatch task dropped the entry without resolving; only
                // happens on engine teardown.
                Err(_) => Err(OpalError::internal("correlation channel closed")),
            },
            _ = tokio::time::sleep(timeout) => {
                self.pending.lock().await.remove(&correlation_id);
                Err(OpalError::timeout(event, timeout.as_millis() as u64))
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if let Some(target) = wire::soft_latency_target_ms(event) {
            if outcome.is_ok() && elapsed_ms > target {
                tracing::warn!(
                    event,
                    elapsed_ms,
                    target_ms = target,
                    "call exceeded soft latency target"
                );
            }
        }

        outcome
    }

    /// Fire-and-forget typing notification. Dropped silently when the
    /// connection is down.
    pub async fn notify_typing(&self, payload: Value) {
        let _ = self
            .connection
            .send(Frame::push(wire::events::TYPING, payload))
            .await;
    }
}

/// Routes inbound frames: correlated responses resolve their pending entry,
/// everything else is re-broadcast as a push event.
async fn dispatch(
    mut inbound: mpsc::Receiver<Frame>,
    pending: Arc<Mutex<HashMap<String, PendingRequest>>>,
    push_events: broadcast::Sender<Frame>,
) {
    while let Some(frame) = inbound.recv().await {
        let Some(correlation_id) = frame.correlation_id.clone() else {
            let _ = push_events.send(frame);
            continue;
        };

        let entry = pending.lock().await.remove(&correlation_id);
        match entry {
            Some(request) => {
                let resolution = if frame.event == request.success_event {
                    Ok(frame.payload)
                } else if frame.event == request.error_event {
                    let message = frame
                        .payload
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unspecified backend error")
                        .to_string();
                    Err(OpalError::remote(frame.event, message))
                } else {
                    tracing::warn!(
                        event = %frame.event,
                        correlation_id,
                        "response event does not match request pairing"
                    );
                    Err(OpalError::remote(frame.event, "unexpected response event"))
                };
                // Receiver may already be gone if the call timed out between
                // our map removal and this send.
                let _ = request.resolve.send(resolution);
            }
            None => {
                tracing::debug!(correlation_id, "dropping late or unknown response");
            }
        }
    }
}
