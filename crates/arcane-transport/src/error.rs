//! Error types for the transport layer.

use crate::ConnectionId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the listening socket failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// The connection was already closed.
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    /// `start` was called on a transport that is already listening.
    #[error("transport already started")]
    AlreadyStarted,

    /// `stop` was called on a transport that is not listening.
    #[error("transport not started")]
    NotStarted,

    /// The listener task ended abnormally during shutdown.
    #[error("transport shut down abnormally: {0}")]
    Shutdown(String),
}
