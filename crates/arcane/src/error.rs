//! Unified error type for the Arcane server.

use arcane_heartbeat::HeartbeatError;
use arcane_protocol::ProtocolError;
use arcane_session::SessionError;
use arcane_transport::TransportError;

use crate::LifecycleState;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `arcane` crate you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum ArcaneError {
    /// A transport-level error (bind, send, close, shutdown).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (authentication).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The heartbeat monitor did not shut down cleanly.
    #[error(transparent)]
    Heartbeat(#[from] HeartbeatError),

    /// `start`/`stop` was called in the wrong lifecycle state.
    #[error("server is {actual}, expected {expected}")]
    InvalidState {
        expected: LifecycleState,
        actual: LifecycleState,
    },
}
