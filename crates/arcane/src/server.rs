//! [`Server`] lifecycle coordinator and [`ServerBuilder`].
//!
//! The server ties the layers together: a [`Transport`] feeding the
//! [`Supervisor`], and a [`HeartbeatMonitor`] sweeping it.
//!
//! ```text
//!          start()                     stop()
//! Stopped ────────→ Starting ──→ Running ────────→ Stopping ──→ Stopped
//!                      │
//!                      └── transport failed to start ──→ Stopped
//! ```
//!
//! `start` returns once the listener is accepting. `stop` returns once the
//! monitor has acknowledged, the transport has closed every connection and
//! the registry is empty.

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use arcane_heartbeat::{HeartbeatConfig, HeartbeatMonitor};
use arcane_session::{AcceptAllAuthenticator, PrincipalDirectory};
use arcane_transport::{Connection, TcpConnection, TcpTransport, Transport};
use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::dispatch::HandlerRegistry;
use crate::handlers::build_default_handlers;
use crate::supervisor::{BootstrapHook, HandlerContext, Supervisor};
use crate::ArcaneError;

/// Where the server is in its start/stop cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builder for an Arcane server.
///
/// # Example
///
/// ```rust,no_run
/// use arcane::prelude::*;
///
/// # async fn run() -> Result<(), ArcaneError> {
/// let mut server = Server::builder().bind("0.0.0.0:6543").build();
/// server.start().await?;
/// // ...
/// server.stop().await
/// # }
/// ```
pub struct ServerBuilder<C: Connection> {
    config: ServerConfig,
    handlers: Option<HandlerRegistry<HandlerContext<C>>>,
    bootstrap: Option<BootstrapHook<C>>,
}

impl<C: Connection> ServerBuilder<C> {
    /// A builder with [`ServerConfig::default`] and the default handlers.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            handlers: None,
            bootstrap: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.config.bind_addr = addr.into();
        self
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.config.delimiter = delimiter;
        self
    }

    pub fn heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.config.heartbeat = heartbeat;
        self
    }

    /// Routes to use instead of [`build_default_handlers`].
    pub fn handlers(mut self, handlers: HandlerRegistry<HandlerContext<C>>) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Runs `hook` once for every new connection, before its first frame.
    pub fn bootstrap<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(HandlerContext<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.bootstrap = Some(Arc::new(move |ctx: HandlerContext<C>| -> BoxFuture<'static, ()> {
            Box::pin(hook(ctx))
        }));
        self
    }

    /// Builds a server over a caller-supplied transport. The transport is
    /// expected to frame with the configured delimiter.
    pub fn build_with_transport<T>(self, transport: T) -> Server<T>
    where
        T: Transport<Connection = C>,
    {
        let handlers = self.handlers.unwrap_or_else(|| {
            build_default_handlers(Arc::new(AcceptAllAuthenticator), Arc::new(PrincipalDirectory))
        });
        let supervisor =
            Supervisor::new(handlers, self.config.delimiter).with_bootstrap_hook(self.bootstrap);

        let (state, _) = watch::channel(LifecycleState::Stopped);
        Server {
            transport,
            supervisor: Arc::new(supervisor),
            heartbeat: self.config.heartbeat,
            state,
            monitor: None,
        }
    }
}

impl ServerBuilder<TcpConnection> {
    /// Builds a server over the delimiter-framed TCP transport.
    pub fn build(self) -> Server<TcpTransport> {
        let transport = TcpTransport::new(self.config.bind_addr.clone(), self.config.delimiter)
            .with_max_frame_len(self.config.max_frame_len);
        self.build_with_transport(transport)
    }
}

impl<C: Connection> Default for ServerBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// A transport, a supervisor and a heartbeat monitor, started and stopped
/// together.
pub struct Server<T: Transport> {
    transport: T,
    supervisor: Arc<Supervisor<T::Connection>>,
    heartbeat: HeartbeatConfig,
    state: watch::Sender<LifecycleState>,
    monitor: Option<HeartbeatMonitor>,
}

impl Server<TcpTransport> {
    /// Creates a builder for a TCP server.
    pub fn builder() -> ServerBuilder<TcpConnection> {
        ServerBuilder::new()
    }
}

impl<T: Transport> Server<T> {
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Watches lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// The bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn supervisor(&self) -> &Arc<Supervisor<T::Connection>> {
        &self.supervisor
    }

    /// Starts accepting connections and sweeping for stale sessions.
    ///
    /// Only valid while [`LifecycleState::Stopped`]. Resolves once the
    /// listener is accepting.
    ///
    /// If the returned future is dropped before it resolves, the server is
    /// left [`LifecycleState::Stopped`] and `start` may be called again.
    pub async fn start(&mut self) -> Result<(), ArcaneError> {
        self.expect(LifecycleState::Stopped)?;
        self.transition(LifecycleState::Starting);
        let mut guard = StartGuard::new(&self.state);

        let stale = self.supervisor.registry().clear();
        if stale > 0 {
            warn!(stale, "cleared sessions left over from a previous run");
        }

        if let Err(e) = self.transport.start(Arc::clone(&self.supervisor)).await {
            error!(error = %e, "transport failed to start");
            return Err(e.into());
        }

        self.monitor = Some(HeartbeatMonitor::spawn(
            Arc::clone(&self.supervisor),
            self.heartbeat,
        ));
        guard.disarm();
        publish(&self.state, LifecycleState::Running);
        info!(addr = ?self.transport.local_addr(), "server running");
        Ok(())
    }

    /// Stops the monitor, then the transport.
    ///
    /// Only valid while [`LifecycleState::Running`]. Both halves are always
    /// shut down and the server always ends up stopped; the first failure,
    /// if any, is returned.
    pub async fn stop(&mut self) -> Result<(), ArcaneError> {
        self.expect(LifecycleState::Running)?;
        self.transition(LifecycleState::Stopping);

        let mut first_error: Option<ArcaneError> = None;

        if let Some(monitor) = self.monitor.take() {
            if let Err(e) = monitor.stop().await {
                error!(error = %e, "heartbeat monitor did not stop cleanly");
                first_error = Some(e.into());
            }
        }

        if let Err(e) = self.transport.stop().await {
            error!(error = %e, "transport did not stop cleanly");
            if first_error.is_none() {
                first_error = Some(e.into());
            }
        }

        let leftover = self.supervisor.registry().clear();
        if leftover > 0 {
            warn!(leftover, "sessions still registered after transport stop");
        }

        self.transition(LifecycleState::Stopped);
        info!("server stopped");
        first_error.map_or(Ok(()), Err)
    }

    fn expect(&self, expected: LifecycleState) -> Result<(), ArcaneError> {
        let actual = self.state();
        if actual == expected {
            Ok(())
        } else {
            Err(ArcaneError::InvalidState { expected, actual })
        }
    }

    fn transition(&self, next: LifecycleState) {
        publish(&self.state, next);
    }
}

fn publish(state: &watch::Sender<LifecycleState>, next: LifecycleState) {
    let previous = state.send_replace(next);
    info!(from = %previous, to = %next, "server state changed");
}

/// Returns the server to `Stopped` unless `start` got all the way to
/// `Running`.
struct StartGuard<'a> {
    state: &'a watch::Sender<LifecycleState>,
    armed: bool,
}

impl<'a> StartGuard<'a> {
    fn new(state: &'a watch::Sender<LifecycleState>) -> Self {
        Self { state, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            publish(self.state, LifecycleState::Stopped);
        }
    }
}

impl<T: Transport> fmt::Debug for Server<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .field("heartbeat", &self.heartbeat)
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}
