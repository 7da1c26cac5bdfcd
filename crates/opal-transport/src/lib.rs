//! Transport layer of the OPAL engine.
//!
//! Owns the physical link to the optimization backend and everything that
//! speaks its protocols: the wire frame model, the connection lifecycle
//! manager with reconnect scheduling, the request correlation broker, and
//! the stateless HTTP fallback client.

pub mod broker;
pub mod connection;
pub mod http;
pub mod transport;
pub mod wire;

pub use broker::RequestBroker;
pub use connection::{ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState};
pub use http::{HttpClient, PromptRecord, SearchHit};
pub use transport::{TcpTransport, Transport, TransportLink};
pub use wire::{Frame, events};
