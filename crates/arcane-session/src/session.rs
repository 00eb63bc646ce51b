//! The server's record of one live connection.
//!
//! A session tracks:
//! - WHICH connection it belongs to (the transport's `ConnectionId`)
//! - WHO is on the other end, once they have authenticated
//! - WHEN they last sent anything, for the liveness sweep
//!
//! It also owns the connection's write handle. Sessions are shared as
//! `Arc<Session<C>>` and never copied.

use std::fmt;

use arcane_protocol::PrincipalId;
use arcane_transport::{Connection, ConnectionId};
use parking_lot::Mutex;
use tokio::time::Instant;

/// Display name used before a session has authenticated.
pub const UNKNOWN_PLAYER: &str = "Unknown";

/// Mutable per-session state, guarded separately from the registry.
#[derive(Debug)]
struct SessionState {
    principal: Option<PrincipalId>,
    last_message: Instant,
}

/// A single connection's session on the server.
pub struct Session<C> {
    id: ConnectionId,
    conn: C,
    state: Mutex<SessionState>,
}

impl<C: Connection> Session<C> {
    /// Wraps a freshly accepted connection. The last-message timestamp
    /// starts at "now" so a silent client still gets a full timeout.
    pub fn new(conn: C) -> Self {
        Self {
            id: conn.id(),
            conn,
            state: Mutex::new(SessionState {
                principal: None,
                last_message: Instant::now(),
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The connection's write handle.
    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.lock().principal.is_some()
    }

    /// The principal this session authenticated as, if any.
    pub fn principal(&self) -> Option<PrincipalId> {
        self.state.lock().principal.clone()
    }

    /// Marks the session authenticated. Authenticating again replaces the
    /// principal.
    pub fn authenticate(&self, principal: PrincipalId) {
        tracing::debug!(conn = %self.id, %principal, "session authenticated");
        self.state.lock().principal = Some(principal);
    }

    pub fn last_message(&self) -> Instant {
        self.state.lock().last_message
    }

    /// Records inbound activity now.
    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    /// Records inbound activity at `at`. The timestamp never moves
    /// backwards.
    pub fn touch_at(&self, at: Instant) {
        let mut state = self.state.lock();
        state.last_message = state.last_message.max(at);
    }

    /// The principal id once authenticated, `"Unknown"` before.
    pub fn display_name(&self) -> String {
        self.state
            .lock()
            .principal
            .as_ref()
            .map_or_else(|| UNKNOWN_PLAYER.to_owned(), PrincipalId::to_string)
    }
}

impl<C> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("principal", &state.principal)
            .field("last_message", &state.last_message)
            .finish_non_exhaustive()
    }
}
