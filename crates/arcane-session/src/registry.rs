//! The connection registry: every live session, keyed by connection id.
//!
//! # Locking
//!
//! The table sits behind a `parking_lot::Mutex` that is only ever held
//! inside the methods below, never across an `.await` and never while a
//! connection is being written to or closed. Code that needs to act on many
//! sessions takes a [`snapshot`](ConnectionRegistry::snapshot) and works on
//! that after the lock is released.

use std::collections::HashMap;
use std::sync::Arc;

use arcane_transport::{Connection, ConnectionId};
use parking_lot::Mutex;

use crate::Session;

/// Concurrency-safe table of live sessions.
pub struct ConnectionRegistry<C> {
    sessions: Mutex<HashMap<ConnectionId, Arc<Session<C>>>>,
}

impl<C: Connection> ConnectionRegistry<C> {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Inserts `session` under its connection id.
    ///
    /// Ids are unique per connection, so replacing an existing entry means
    /// something upstream is broken. It is logged and the old session is
    /// handed back.
    pub fn add(&self, session: Arc<Session<C>>) -> Option<Arc<Session<C>>> {
        let id = session.id();
        let previous = self.sessions.lock().insert(id, session);
        if previous.is_some() {
            tracing::warn!(conn = %id, "session replaced an existing registration");
        }
        previous
    }

    /// Removes and returns the session for `id`. Removing an id that is not
    /// registered is a no-op.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Session<C>>> {
        self.sessions.lock().remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Session<C>>> {
        self.sessions.lock().get(&id).cloned()
    }

    /// Every registered session at this instant.
    pub fn snapshot(&self) -> Vec<Arc<Session<C>>> {
        self.sessions.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Drops every entry and returns how many there were.
    pub fn clear(&self) -> usize {
        let mut sessions = self.sessions.lock();
        let cleared = sessions.len();
        sessions.clear();
        cleared
    }
}

impl<C: Connection> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
