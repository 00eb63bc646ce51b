//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! WebSocket messages are already framed, so each text or binary message
//! is delivered as one frame. Outbound data is sent as binary messages.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify, watch};
use tokio_tungstenite::tungstenite::Message;

use crate::listener::{ListenerTask, next_connection_id, shutdown_requested};
use crate::{Connection, ConnectionEvents, ConnectionId, Transport, TransportError};

/// How long a client gets to complete the WebSocket upgrade.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    addr: String,
    listener: Option<ListenerTask>,
}

impl WebSocketTransport {
    /// Creates a transport that will bind `addr` when started.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            listener: None,
        }
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;

    async fn start<E>(&mut self, events: Arc<E>) -> Result<(), TransportError>
    where
        E: ConnectionEvents<WebSocketConnection>,
    {
        if self.listener.is_some() {
            return Err(TransportError::AlreadyStarted);
        }

        let listener = ListenerTask::bind(&self.addr, move |stream, peer, shutdown| {
            serve_connection(stream, peer, Arc::clone(&events), shutdown)
        })
        .await?;

        self.listener = Some(listener);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), TransportError> {
        let listener = self.listener.take().ok_or(TransportError::NotStarted)?;
        listener.shutdown().await
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(ListenerTask::local_addr)
    }
}

/// The sending half of a single WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    local_addr: Option<SocketAddr>,
    sink: Mutex<SplitSink<WsStream, Message>>,
    closing: Arc<Notify>,
    closed: AtomicBool,
}

fn ws_error(kind: std::io::ErrorKind, e: tokio_tungstenite::tungstenite::Error) -> std::io::Error {
    std::io::Error::new(kind, e)
}

impl Connection for WebSocketConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed(self.id));
        }
        let msg = Message::Binary(data.to_vec().into());
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(ws_error(std::io::ErrorKind::BrokenPipe, e))
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.closing.notify_one();
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(ws_error(std::io::ErrorKind::BrokenPipe, e))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer_addr)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

async fn serve_connection<E>(
    stream: TcpStream,
    peer_addr: SocketAddr,
    events: Arc<E>,
    mut shutdown: watch::Receiver<bool>,
) where
    E: ConnectionEvents<WebSocketConnection>,
{
    let local_addr = stream.local_addr().ok();
    let ws = match tokio::time::timeout(
        HANDSHAKE_TIMEOUT,
        tokio_tungstenite::accept_async(stream),
    )
    .await
    {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            tracing::debug!(%peer_addr, error = %e, "WebSocket upgrade failed");
            return;
        }
        Err(_) => {
            tracing::debug!(%peer_addr, "WebSocket upgrade timed out");
            return;
        }
    };

    let (sink, mut stream) = ws.split();
    let id = next_connection_id();
    let closing = Arc::new(Notify::new());
    let conn = WebSocketConnection {
        id,
        peer_addr,
        local_addr,
        sink: Mutex::new(sink),
        closing: Arc::clone(&closing),
        closed: AtomicBool::new(false),
    };
    tracing::debug!(conn = %id, %peer_addr, "accepted WebSocket connection");

    Arc::clone(&events).on_connect(conn).await;

    loop {
        let msg = tokio::select! {
            _ = closing.notified() => break,
            _ = shutdown_requested(&mut shutdown) => break,
            msg = stream.next() => msg,
        };

        let frame = match msg {
            Some(Ok(Message::Binary(data))) => data.to_vec(),
            Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
            Some(Ok(Message::Close(_))) | None => {
                tracing::debug!(conn = %id, "connection closed by peer");
                break;
            }
            Some(Ok(_)) => continue, // ping/pong/raw frame
            Some(Err(e)) => {
                tracing::debug!(conn = %id, error = %e, "receive failed");
                break;
            }
        };
        Arc::clone(&events).on_frame(id, frame).await;
    }

    events.on_close(id).await;
}
