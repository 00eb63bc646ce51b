//! The session supervisor: owns every live session and everything that
//! happens to one.
//!
//! The transport reports connection events here (through
//! [`ConnectionEvents`]); the supervisor turns them into sessions, decodes
//! frames into envelopes and hands those to the [`HandlerRegistry`].
//! Handlers and the heartbeat monitor call back in to send, broadcast and
//! kick.
//!
//! ```text
//! transport ──on_connect──→ registry.add ──→ bootstrap hook
//!           ──on_frame────→ touch ──→ decode ──→ dispatch ──→ handler
//!           ──on_close────→ registry.remove
//! handler / heartbeat ──→ send_to / broadcast / kick ──→ connection
//! ```
//!
//! # Failure policy
//!
//! Inbound trouble never closes a connection. A frame that doesn't decode,
//! a tag with no handler, an unauthenticated sender and a failing handler
//! are all logged and the frame is dropped. Only the heartbeat monitor (or
//! an explicit [`Supervisor::kick`]) disconnects a peer.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use arcane_heartbeat::Liveness;
use arcane_protocol::{Chat, Disc, Envelope, JsonCodec, decode_frame, encode_frame};
use arcane_session::{ConnectionRegistry, Session};
use arcane_transport::{Connection, ConnectionEvents, ConnectionId};
use futures_util::future::BoxFuture;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::dispatch::{Authenticated, DispatchError, HandlerRegistry};
use crate::ArcaneError;

/// What a handler (or the bootstrap hook) gets to work with: the session
/// the message came from and the supervisor to reply through.
pub struct HandlerContext<C: Connection> {
    supervisor: Arc<Supervisor<C>>,
    session: Arc<Session<C>>,
}

impl<C: Connection> HandlerContext<C> {
    pub fn new(supervisor: Arc<Supervisor<C>>, session: Arc<Session<C>>) -> Self {
        Self {
            supervisor,
            session,
        }
    }

    pub fn supervisor(&self) -> &Arc<Supervisor<C>> {
        &self.supervisor
    }

    pub fn session(&self) -> &Arc<Session<C>> {
        &self.session
    }

    /// Sends `envelope` back to the session this context belongs to.
    pub async fn reply(&self, envelope: &Envelope) -> Result<(), ArcaneError> {
        self.supervisor.send_to(&self.session, envelope).await
    }
}

impl<C: Connection> Clone for HandlerContext<C> {
    fn clone(&self) -> Self {
        Self {
            supervisor: Arc::clone(&self.supervisor),
            session: Arc::clone(&self.session),
        }
    }
}

impl<C: Connection> Authenticated for HandlerContext<C> {
    fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }
}

/// Runs once per new connection, after its session is registered and
/// before any of its frames are dispatched.
pub type BootstrapHook<C> = Arc<dyn Fn(HandlerContext<C>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Connection lifecycle, inbound routing and outbound delivery.
pub struct Supervisor<C: Connection> {
    registry: ConnectionRegistry<C>,
    handlers: HandlerRegistry<HandlerContext<C>>,
    codec: JsonCodec,
    delimiter: u8,
    bootstrap: Option<BootstrapHook<C>>,
}

impl<C: Connection> Supervisor<C> {
    pub fn new(handlers: HandlerRegistry<HandlerContext<C>>, delimiter: u8) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            handlers,
            codec: JsonCodec,
            delimiter,
            bootstrap: None,
        }
    }

    /// Installs a hook that runs for every new connection.
    pub fn with_bootstrap<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(HandlerContext<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.bootstrap = Some(Arc::new(move |ctx: HandlerContext<C>| -> BoxFuture<'static, ()> {
            Box::pin(hook(ctx))
        }));
        self
    }

    pub(crate) fn with_bootstrap_hook(mut self, hook: Option<BootstrapHook<C>>) -> Self {
        self.bootstrap = hook;
        self
    }

    pub fn registry(&self) -> &ConnectionRegistry<C> {
        &self.registry
    }

    pub fn handlers(&self) -> &HandlerRegistry<HandlerContext<C>> {
        &self.handlers
    }

    pub fn session(&self, id: ConnectionId) -> Option<Arc<Session<C>>> {
        self.registry.get(id)
    }

    /// Snapshot of every live session.
    pub fn sessions(&self) -> Vec<Arc<Session<C>>> {
        self.registry.snapshot()
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Serializes and frames an outbound envelope. Failing here means the
    /// server built something it cannot encode, so it is logged loudly.
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, ArcaneError> {
        encode_frame(&self.codec, envelope, self.delimiter).map_err(|e| {
            error!(tag = %envelope.kind(), error = %e, "failed to serialize outbound envelope");
            ArcaneError::Protocol(e)
        })
    }

    /// Sends `envelope` to one session.
    pub async fn send_to(&self, session: &Session<C>, envelope: &Envelope) -> Result<(), ArcaneError> {
        let bytes = self.encode(envelope)?;
        debug!(conn = %session.id(), tag = %envelope.kind(), len = bytes.len(), "sending envelope");
        session.connection().send(&bytes).await?;
        Ok(())
    }

    /// Sends `envelope` to every session whose id is not in `exclude`.
    ///
    /// The envelope is serialized once and the same bytes go to every
    /// recipient. A recipient that fails is logged and skipped. Returns how
    /// many sessions were written to.
    pub async fn broadcast(&self, envelope: &Envelope, exclude: &[ConnectionId]) -> Result<usize, ArcaneError> {
        let bytes = self.encode(envelope)?;
        let recipients = self.registry.snapshot();

        let mut delivered = 0;
        for session in recipients.iter().filter(|s| !exclude.contains(&s.id())) {
            match session.connection().send(&bytes).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(conn = %session.id(), tag = %envelope.kind(), error = %e, "broadcast send failed");
                }
            }
        }

        debug!(
            tag = %envelope.kind(),
            delivered,
            excluded = exclude.len(),
            "broadcast envelope"
        );
        Ok(delivered)
    }

    /// Disconnects `session`.
    ///
    /// Everyone else is told who is being kicked and why, the victim gets a
    /// `Disc` with the reason, and only then is the connection closed. A
    /// notice that fails to send is logged and doesn't stop the kick.
    pub async fn kick(&self, session: &Session<C>, reason: &str) -> Result<(), ArcaneError> {
        let id = session.id();
        info!(conn = %id, player = %session.display_name(), reason, "kicking session");

        let notice = Envelope::new(Chat::server(format!(
            "Kicking player {}. (Reason: {})",
            session.display_name(),
            reason
        )));
        if let Err(e) = self.broadcast(&notice, &[id]).await {
            warn!(conn = %id, error = %e, "failed to announce kick");
        }

        let disc = Envelope::new(Disc {
            reason: reason.to_owned(),
        });
        if let Err(e) = self.send_to(session, &disc).await {
            warn!(conn = %id, error = %e, "failed to send disconnect notice");
        }

        self.registry.remove(id);
        session.connection().close().await?;
        Ok(())
    }

    /// Decodes and dispatches one inbound frame.
    async fn handle_frame(self: Arc<Self>, id: ConnectionId, frame: Vec<u8>) {
        let Some(session) = self.registry.get(id) else {
            warn!(conn = %id, "frame for unknown connection dropped");
            return;
        };
        session.touch();

        let envelope = match decode_frame(&self.codec, &frame, self.delimiter) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(conn = %id, error = %e, len = frame.len(), "dropping malformed frame");
                return;
            }
        };

        let kind = envelope.kind();
        debug!(conn = %id, tag = %kind, "received envelope");

        let ctx = HandlerContext::new(Arc::clone(&self), session);
        match self.handlers.dispatch(ctx, envelope).await {
            Ok(()) => {}
            Err(DispatchError::HandlerNotFound(_)) => {
                warn!(conn = %id, tag = %kind, "no handler for message, dropping");
            }
            Err(DispatchError::Unauthorized(_)) => {
                warn!(conn = %id, tag = %kind, "unauthenticated sender, dropping");
            }
            Err(e @ DispatchError::Handler { .. }) => {
                warn!(conn = %id, tag = %kind, error = %e, "handler failed");
            }
        }
    }
}

impl<C: Connection> ConnectionEvents<C> for Supervisor<C> {
    async fn on_connect(self: Arc<Self>, conn: C) {
        let session = Arc::new(Session::new(conn));
        let id = session.id();
        self.registry.add(Arc::clone(&session));
        info!(
            conn = %id,
            peer = ?session.connection().peer_addr(),
            sessions = self.registry.len(),
            "session opened"
        );

        if let Some(hook) = &self.bootstrap {
            hook(HandlerContext::new(Arc::clone(&self), session)).await;
        }
    }

    async fn on_frame(self: Arc<Self>, id: ConnectionId, frame: Vec<u8>) {
        self.handle_frame(id, frame).await;
    }

    async fn on_close(self: Arc<Self>, id: ConnectionId) {
        if self.registry.remove(id).is_some() {
            info!(conn = %id, sessions = self.registry.len(), "session closed");
        } else {
            debug!(conn = %id, "session already removed");
        }
    }
}

impl<C: Connection> Liveness for Supervisor<C> {
    type Peer = ConnectionId;

    fn last_seen(&self) -> Vec<(ConnectionId, Instant)> {
        self.registry
            .snapshot()
            .iter()
            .map(|session| (session.id(), session.last_message()))
            .collect()
    }

    async fn evict(&self, peer: ConnectionId, cutoff: Instant, reason: &str) -> bool {
        let Some(session) = self.registry.get(peer) else {
            return false;
        };
        if session.last_message() >= cutoff {
            return false;
        }
        if let Err(e) = self.kick(&session, reason).await {
            warn!(conn = %peer, error = %e, "failed to close evicted session");
        }
        true
    }
}

impl<C: Connection> fmt::Debug for Supervisor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("sessions", &self.registry.len())
            .field("handlers", &self.handlers)
            .field("delimiter", &self.delimiter)
            .finish_non_exhaustive()
    }
}
