//! Accept loop and shutdown plumbing shared by the stream transports.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::{ConnectionId, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_connection_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// Resolves once shutdown has been requested (or the sender is gone).
pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stopped| *stopped).await;
}

/// A running accept loop plus the per-connection tasks it spawned.
pub(crate) struct ListenerTask {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ListenerTask {
    /// Binds `addr` and spawns the accept loop. Returns once the socket is
    /// bound, i.e. once connections can be accepted.
    pub(crate) async fn bind<F, Fut>(
        addr: &str,
        serve: F,
    ) -> Result<Self, TransportError>
    where
        F: Fn(TcpStream, SocketAddr, watch::Receiver<bool>) -> Fut
            + Send
            + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr).await.map_err(|source| {
            TransportError::Bind {
                addr: addr.to_string(),
                source,
            }
        })?;
        let local_addr = listener.local_addr().map_err(|source| {
            TransportError::Bind {
                addr: addr.to_string(),
                source,
            }
        })?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(accept_loop(listener, serve, shutdown_rx));

        tracing::info!(%local_addr, "transport listening");
        Ok(Self {
            local_addr,
            shutdown,
            handle,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting, tells every connection task to finish and waits
    /// until all of them have.
    pub(crate) async fn shutdown(self) -> Result<(), TransportError> {
        self.shutdown.send_replace(true);
        self.handle
            .await
            .map_err(|e| TransportError::Shutdown(e.to_string()))?;
        tracing::info!(local_addr = %self.local_addr, "transport stopped");
        Ok(())
    }
}

async fn accept_loop<F, Fut>(
    listener: TcpListener,
    serve: F,
    mut shutdown: watch::Receiver<bool>,
) where
    F: Fn(TcpStream, SocketAddr, watch::Receiver<bool>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(serve(stream, peer, shutdown.clone()));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            },
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = finished {
                    tracing::error!(error = %e, "connection task failed");
                }
            }
        }
    }

    drop(listener);
    tracing::debug!(
        open = connections.len(),
        "accept loop stopped, draining connections"
    );
    while let Some(finished) = connections.join_next().await {
        if let Err(e) = finished {
            tracing::error!(error = %e, "connection task failed");
        }
    }
}
