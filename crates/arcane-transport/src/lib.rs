//! Transport abstraction layer for Arcane.
//!
//! A transport owns the listening socket, the accept loop and one reader
//! task per connection. It reports what happens on the wire through the
//! [`ConnectionEvents`] callbacks and hands each new connection's write
//! side over as a [`Connection`] handle.
//!
//! ```text
//!  accept loop ──→ on_connect(handle)
//!  reader task ──→ on_frame(id, bytes)   (zero or more, in order)
//!  reader task ──→ on_close(id)          (exactly once)
//! ```
//!
//! Two rules every implementation follows:
//!
//! - `on_connect` is awaited before the first frame of that connection is
//!   read, so whatever the callback registers is visible to `on_frame`.
//! - `on_close` is always raised from the connection's own reader task.
//!   [`Connection::close`] only signals that task; it never calls back into
//!   the events sink on the caller's stack.
//!
//! # Feature Flags
//!
//! - `tcp` (default) — delimiter-framed TCP transport
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`

mod error;
mod listener;
#[cfg(feature = "tcp")]
mod tcp;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "tcp")]
pub use tcp::{TcpConnection, TcpTransport};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Default upper bound for a single inbound frame.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Opaque identifier for a connection, unique for the life of the process.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The write side of one live connection.
///
/// Writes through a single handle are serialized, so sends issued by one
/// task arrive in the order they were issued.
pub trait Connection: Send + Sync + 'static {
    /// Writes `data` to the peer. The caller supplies any framing.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Closes the connection.
    ///
    /// The matching [`ConnectionEvents::on_close`] is raised later by the
    /// connection's reader task, never from inside this call.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Address of the remote peer, if known.
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Local address the connection was accepted on, if known.
    fn local_addr(&self) -> Option<SocketAddr>;
}

/// Receives connection lifecycle and inbound frame notifications.
pub trait ConnectionEvents<C: Connection>: Send + Sync + 'static {
    /// A connection was accepted. Ownership of its handle moves to the sink.
    fn on_connect(self: Arc<Self>, conn: C) -> impl Future<Output = ()> + Send;

    /// A complete frame arrived, delimiter included when the transport
    /// frames by delimiter.
    fn on_frame(
        self: Arc<Self>,
        id: ConnectionId,
        frame: Vec<u8>,
    ) -> impl Future<Output = ()> + Send;

    /// The connection is gone. Raised exactly once per accepted connection.
    fn on_close(self: Arc<Self>, id: ConnectionId) -> impl Future<Output = ()> + Send;
}

/// A listener that accepts connections and drives their reader tasks.
pub trait Transport: Send + Sync + 'static {
    /// The connection handle type produced by this transport.
    type Connection: Connection;

    /// Binds and starts accepting. Resolves once the listener is accepting.
    fn start<E>(
        &mut self,
        events: Arc<E>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send
    where
        E: ConnectionEvents<Self::Connection>;

    /// Stops accepting, closes every open connection and resolves once all
    /// reader tasks (and therefore all `on_close` callbacks) have finished.
    fn stop(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// The bound address while the transport is running.
    fn local_addr(&self) -> Option<SocketAddr>;
}
