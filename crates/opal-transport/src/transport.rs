//! Physical transport abstraction.
//!
//! The connection manager talks to the network only through the
//! [`Transport`] trait. The production implementation frames newline-
//! delimited JSON over a TCP stream; tests substitute an in-memory channel
//! transport.

use crate::wire::Frame;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use opal_core::error::{OpalError, Result};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};

/// Channel capacity for each direction of an open link.
const LINK_BUFFER: usize = 64;

/// One open bidirectional link.
///
/// The link is alive as long as both halves are; when the peer closes,
/// `inbound` yields `None` and the connection manager treats that as a
/// disconnect.
pub struct TransportLink {
    /// Frames to send to the backend.
    pub outbound: mpsc::Sender<Frame>,
    /// Frames received from the backend.
    pub inbound: mpsc::Receiver<Frame>,
}

/// Opens physical links to the backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establishes one link. Called again by the connection manager for
    /// every reconnect attempt.
    async fn open(&self) -> Result<TransportLink>;
}

/// Newline-delimited JSON frames over TCP.
pub struct TcpTransport {
    addr: String,
}

impl TcpTransport {
    /// Creates a transport that connects to `addr` (host:port).
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&self) -> Result<TransportLink> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| OpalError::io(format!("connect {}: {}", self.addr, e)))?;
        let framed = Framed::new(stream, LinesCodec::new());
        let (mut sink, mut stream) = framed.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(LINK_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel::<Frame>(LINK_BUFFER);

        // Writer: serialize outbound frames onto the socket. Ends when the
        // sender side is dropped or the socket breaks.
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let line = match serde_json::to_string(&frame) {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!(event = %frame.event, "dropping unserializable frame: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(line).await {
                    tracing::debug!("socket write failed: {}", e);
                    break;
                }
            }
        });

        // Reader: parse inbound lines into frames. Ends on EOF or receiver
        // drop, which closes `inbound` and signals disconnect upstream.
        tokio::spawn(async move {
            while let Some(line) = stream.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::debug!("socket read failed: {}", e);
                        break;
                    }
                };
                match serde_json::from_str::<Frame>(&line) {
                    Ok(frame) => {
                        if inbound_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("ignoring malformed frame: {}", e);
                    }
                }
            }
        });

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
