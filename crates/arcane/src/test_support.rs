//! In-memory connections for unit tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arcane_protocol::{DEFAULT_DELIMITER, Envelope, JsonCodec, decode_frame};
use arcane_session::{AcceptAllAuthenticator, PrincipalDirectory, Session};
use arcane_transport::{Connection, ConnectionEvents, ConnectionId, TransportError};
use parking_lot::Mutex;

use crate::handlers::build_default_handlers;
use crate::supervisor::Supervisor;

/// One observable write-side event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Wire {
    Sent(Vec<u8>),
    Closed,
}

type Log = Arc<Mutex<Vec<(ConnectionId, Wire)>>>;

/// Hands out connections that all record into one ordered log.
#[derive(Default, Clone)]
pub(crate) struct Wiretap {
    log: Log,
}

impl Wiretap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn connection(&self, id: u64) -> RecordingConnection {
        RecordingConnection {
            id: ConnectionId::new(id),
            log: Arc::clone(&self.log),
            fail_sends: false,
            closed: AtomicBool::new(false),
        }
    }

    /// A connection whose every send fails.
    pub(crate) fn broken_connection(&self, id: u64) -> RecordingConnection {
        RecordingConnection {
            fail_sends: true,
            ..self.connection(id)
        }
    }

    /// Every event, in the order it happened.
    pub(crate) fn events(&self) -> Vec<(ConnectionId, Wire)> {
        self.log.lock().clone()
    }

    /// Raw frames written to `id`.
    pub(crate) fn frames_to(&self, id: u64) -> Vec<Vec<u8>> {
        self.log
            .lock()
            .iter()
            .filter_map(|(conn, wire)| match wire {
                Wire::Sent(bytes) if *conn == ConnectionId::new(id) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    /// Frames written to `id`, decoded.
    pub(crate) fn envelopes_to(&self, id: u64) -> Vec<Envelope> {
        self.frames_to(id)
            .iter()
            .map(|frame| {
                decode_frame(&JsonCodec, frame, DEFAULT_DELIMITER).expect("server sent a bad frame")
            })
            .collect()
    }

    /// Forgets everything recorded so far.
    pub(crate) fn clear(&self) {
        self.log.lock().clear();
    }

    pub(crate) fn was_closed(&self, id: u64) -> bool {
        self.log
            .lock()
            .iter()
            .any(|(conn, wire)| *conn == ConnectionId::new(id) && *wire == Wire::Closed)
    }
}

pub(crate) struct RecordingConnection {
    id: ConnectionId,
    log: Log,
    fail_sends: bool,
    closed: AtomicBool,
}

impl Connection for RecordingConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed(self.id));
        }
        if self.fail_sends {
            return Err(TransportError::SendFailed(std::io::Error::other("broken pipe")));
        }
        self.log.lock().push((self.id, Wire::Sent(data.to_vec())));
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.log.lock().push((self.id, Wire::Closed));
        }
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// A supervisor running the default handlers over recorded connections.
pub(crate) struct Harness {
    pub(crate) supervisor: Arc<Supervisor<RecordingConnection>>,
    pub(crate) tap: Wiretap,
}

impl Harness {
    pub(crate) fn with_default_handlers() -> Self {
        let handlers =
            build_default_handlers(Arc::new(AcceptAllAuthenticator), Arc::new(PrincipalDirectory));
        Self {
            supervisor: Arc::new(Supervisor::new(handlers, DEFAULT_DELIMITER)),
            tap: Wiretap::new(),
        }
    }

    pub(crate) async fn connect(&self, id: u64) -> Arc<Session<RecordingConnection>> {
        Arc::clone(&self.supervisor)
            .on_connect(self.tap.connection(id))
            .await;
        self.supervisor
            .session(ConnectionId::new(id))
            .expect("session registered on connect")
    }

    /// Connects and authenticates through the Auth handler, then forgets
    /// everything that was sent along the way.
    pub(crate) async fn login(&self, id: u64, token: &str) -> Arc<Session<RecordingConnection>> {
        let session = self.connect(id).await;
        self.receive(id, &format!(r#"{{"tag":"Auth","payload":{{"Token":"{token}"}}}}"#))
            .await;
        assert!(session.is_authenticated(), "login as {token} failed");
        self.tap.clear();
        session
    }

    /// Feeds one JSON record to the supervisor as if `id` had sent it.
    pub(crate) async fn receive(&self, id: u64, json: &str) {
        let mut frame = json.as_bytes().to_vec();
        frame.push(DEFAULT_DELIMITER);
        Arc::clone(&self.supervisor)
            .on_frame(ConnectionId::new(id), frame)
            .await;
    }
}
