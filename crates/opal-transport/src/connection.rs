//! Connection lifecycle management.
//!
//! `ConnectionManager` owns the one physical link to the backend. No other
//! component touches the transport directly: callers send frames through
//! [`ConnectionManager::send`] and receive inbound frames from the receiver
//! handed out at construction time, which stays valid across reconnects.

use crate::transport::Transport;
use crate::wire::Frame;
use opal_core::error::{OpalError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, broadcast, mpsc, watch};

/// Capacity of the fan-in channel carrying inbound frames to the broker.
const INBOUND_BUFFER: usize = 256;

/// Lifecycle state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Lifecycle events, consumable by the correlation layer and by status
/// indicators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    /// A reconnect attempt was scheduled with the given linear-backoff delay.
    ReconnectScheduled { attempt: u32, delay_ms: u64 },
    /// The reconnect cap was reached; the manager stays disconnected until
    /// `connect()` is called again.
    ReconnectsExhausted,
}

/// Reconnection policy.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Maximum number of reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Base delay; attempt `n` waits `base_delay * n`.
    pub base_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Owns the physical link and its reconnect loop.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    config: ConnectionConfig,
    state: Arc<RwLock<ConnectionState>>,
    /// Reconnect attempts in the current cycle; reset on successful connect.
    attempts: Arc<AtomicU32>,
    /// Sender half of the currently open link, if any.
    outbound: Arc<RwLock<Option<mpsc::Sender<Frame>>>>,
    /// Fan-in for inbound frames, surviving reconnects.
    inbound_tx: mpsc::Sender<Frame>,
    events: broadcast::Sender<ConnectionEvent>,
    /// Shutdown signal for the running supervisor task, if any.
    shutdown: Arc<RwLock<Option<watch::Sender<bool>>>>,
}

impl ConnectionManager {
    /// Creates a manager and the receiver for all inbound frames.
    ///
    /// The receiver is handed to the request broker; it keeps yielding
    /// frames across reconnect cycles.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: ConnectionConfig,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        let (events, _) = broadcast::channel(32);
        let manager = Self {
            transport,
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            attempts: Arc::new(AtomicU32::new(0)),
            outbound: Arc::new(RwLock::new(None)),
            inbound_tx,
            events,
            shutdown: Arc::new(RwLock::new(None)),
        };
        (manager, inbound_rx)
    }

    /// Returns the current connection state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Returns the reconnect attempt count of the current cycle.
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Sends a frame over the open link.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` when no link is open.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        let outbound = self.outbound.read().await;
        let sender = outbound.as_ref().ok_or(OpalError::NotConnected)?;
        sender
            .send(frame)
            .await
            .map_err(|_| OpalError::NotConnected)
    }

    /// Establishes the connection if not already Connected or Connecting.
    ///
    /// Idempotent: calling while a cycle is in flight is a no-op. Spawns the
    /// supervisor task that opens the link, pumps inbound frames, and
    /// schedules reconnects on link loss.
    pub async fn connect(&self) {
        {
            let mut state = self.state.write().await;
            if *state != ConnectionState::Disconnected {
                return;
            }
            *state = ConnectionState::Connecting;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.shutdown.write().await = Some(shutdown_tx);
        self.attempts.store(0, Ordering::SeqCst);

        tokio::spawn(supervisor(
            self.transport.clone(),
            self.config.clone(),
            self.state.clone(),
            self.attempts.clone(),
            self.outbound.clone(),
            self.inbound_tx.clone(),
            self.events.clone(),
            shutdown_rx,
        ));
    }

    /// Tears down the connection. Terminal until `connect()` is called again.
    pub async fn disconnect(&self) {
        if let Some(shutdown) = self.shutdown.write().await.take() {
            let _ = shutdown.send(true);
        }
        *self.outbound.write().await = None;
        *self.state.write().await = ConnectionState::Disconnected;
    }
}

fn shutting_down(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// One connect/pump/reconnect cycle. Runs until disconnect or until the
/// reconnect cap is reached.
#[allow(clippy::too_many_arguments)]
async fn supervisor(
    transport: Arc<dyn Transport>,
    config: ConnectionConfig,
    state: Arc<RwLock<ConnectionState>>,
    attempts: Arc<AtomicU32>,
    outbound: Arc<RwLock<Option<mpsc::Sender<Frame>>>>,
    inbound_tx: mpsc::Sender<Frame>,
    events: broadcast::Sender<ConnectionEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if shutting_down(&shutdown) {
            break;
        }

        match transport.open().await {
            Ok(link) => {
                attempts.store(0, Ordering::SeqCst);
                *outbound.write().await = Some(link.outbound);
                *state.write().await = ConnectionState::Connected;
                let _ = events.send(ConnectionEvent::Connected);
                tracing::info!("connected to backend");

                let mut inbound = link.inbound;
                loop {
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() || shutting_down(&shutdown) {
                                break;
                            }
                        }
                        frame = inbound.recv() => match frame {
                            Some(frame) => {
                                let _ = inbound_tx.send(frame).await;
                            }
                            None => break,
                        },
                    }
                }

                *outbound.write().await = None;
                *state.write().await = ConnectionState::Disconnected;
                let _ = events.send(ConnectionEvent::Disconnected);
                tracing::info!("link closed");
            }
            Err(e) => {
                *state.write().await = ConnectionState::Disconnected;
                tracing::warn!("connect failed: {}", e);
            }
        }

        if shutting_down(&shutdown) {
            break;
        }

        let attempt = attempts.load(Ordering::SeqCst) + 1;
        if attempt > config.max_reconnect_attempts {
            let _ = events.send(ConnectionEvent::ReconnectsExhausted);
            tracing::warn!(
                max = config.max_reconnect_attempts,
                "reconnect attempts exhausted"
            );
            break;
        }
        attempts.store(attempt, Ordering::SeqCst);

        // Linear backoff: attempt n waits base_delay * n.
        let delay = config.base_delay * attempt;
        let _ = events.send(ConnectionEvent::ReconnectScheduled {
            attempt,
            delay_ms: delay.as_millis() as u64,
        });
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {
                if shutting_down(&shutdown) {
                    break;
                }
            }
        }
        *state.write().await = ConnectionState::Connecting;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportLink;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Backend-side handles of one opened test link.
    struct BackendLink {
        to_client: mpsc::Sender<Frame>,
        from_client: mpsc::Receiver<Frame>,
    }

    /// Transport whose first `fail_first` opens fail; successful opens hand
    /// the backend half to the test through a channel.
    struct TestTransport {
        fail_first: AtomicU32,
        opens: AtomicU32,
        backend: Mutex<Option<mpsc::UnboundedSender<BackendLink>>>,
    }

    impl TestTransport {
        fn new(fail_first: u32) -> (Arc<Self>, mpsc::UnboundedReceiver<BackendLink>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let transport = Arc::new(Self {
                fail_first: AtomicU32::new(fail_first),
                opens: AtomicU32::new(0),
                backend: Mutex::new(Some(tx)),
            });
            (transport, rx)
        }

        fn open_count(&self) -> u32 {
            self.opens.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for TestTransport {
        async fn open(&self) -> Result<TransportLink> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let remaining = self.fail_first.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_first.store(remaining - 1, Ordering::SeqCst);
                return Err(OpalError::io("simulated connect failure"));
            }

            let (out_tx, out_rx) = mpsc::channel(16);
            let (in_tx, in_rx) = mpsc::channel(16);
            let backend = BackendLink {
                to_client: in_tx,
                from_client: out_rx,
            };
            if let Some(sender) = self.backend.lock().unwrap().as_ref() {
                let _ = sender.send(backend);
            }
            Ok(TransportLink {
                outbound: out_tx,
                inbound: in_rx,
            })
        }
    }

    fn fast_config(max: u32) -> ConnectionConfig {
        ConnectionConfig {
            max_reconnect_attempts: max,
            base_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_connect_reaches_connected_state() {
        let (transport, mut backends) = TestTransport::new(0);
        let (manager, _inbound) = ConnectionManager::new(transport.clone(), fast_config(3));
        let mut events = manager.subscribe();

        manager.connect().await;
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Connected);
        assert_eq!(manager.state().await, ConnectionState::Connected);
        assert_eq!(manager.reconnect_attempts(), 0);

        // Keep the backend link alive until the end of the test.
        let _backend = backends.recv().await.unwrap();
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (transport, mut backends) = TestTransport::new(0);
        let (manager, _inbound) = ConnectionManager::new(transport.clone(), fast_config(3));

        manager.connect().await;
        let _backend = backends.recv().await.unwrap();
        manager.connect().await;
        manager.connect().await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test]
    async fn test_reconnects_after_link_loss() {
        let (transport, mut backends) = TestTransport::new(0);
        let (manager, _inbound) = ConnectionManager::new(transport.clone(), fast_config(3));
        let mut events = manager.subscribe();

        manager.connect().await;
        let backend = backends.recv().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Connected);

        // Drop the backend half: the link closes and a reconnect follows.
        drop(backend);
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Disconnected);
        assert_eq!(
            events.recv().await.unwrap(),
            ConnectionEvent::ReconnectScheduled {
                attempt: 1,
                delay_ms: 5
            }
        );
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Connected);

        let _backend = backends.recv().await.unwrap();
        assert_eq!(manager.state().await, ConnectionState::Connected);
        assert_eq!(transport.open_count(), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let (transport, _backends) = TestTransport::new(u32::MAX);
        let (manager, _inbound) = ConnectionManager::new(transport.clone(), fast_config(3));
        let mut events = manager.subscribe();

        manager.connect().await;

        let mut scheduled = 0;
        loop {
            match events.recv().await.unwrap() {
                ConnectionEvent::ReconnectScheduled { attempt, delay_ms } => {
                    scheduled += 1;
                    assert_eq!(attempt, scheduled);
                    // Linear backoff: delay grows with the attempt number.
                    assert_eq!(delay_ms, 5 * attempt as u64);
                }
                ConnectionEvent::ReconnectsExhausted => break,
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert_eq!(scheduled, 3);
        assert_eq!(manager.state().await, ConnectionState::Disconnected);
        // Initial try plus three reconnects.
        assert_eq!(transport.open_count(), 4);
    }

    #[tokio::test]
    async fn test_disconnect_is_terminal_until_reconnect() {
        let (transport, mut backends) = TestTransport::new(0);
        let (manager, _inbound) = ConnectionManager::new(transport.clone(), fast_config(3));

        manager.connect().await;
        let _backend = backends.recv().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        manager.disconnect().await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(manager.state().await, ConnectionState::Disconnected);
        let err = manager
            .send(Frame::push("typing", serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(err.is_not_connected());
        // No reconnect was attempted after explicit disconnect.
        assert_eq!(transport.open_count(), 1);

        // A fresh connect() starts a new cycle.
        manager.connect().await;
        let _backend = backends.recv().await.unwrap();
        assert_eq!(manager.state().await, ConnectionState::Connected);
    }
}
