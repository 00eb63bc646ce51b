//! Delimiter-framed TCP transport.
//!
//! Every frame on the wire is a run of bytes terminated by a single
//! delimiter byte (`\n` by default). Frames are handed to
//! [`ConnectionEvents::on_frame`] with the delimiter still attached.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, Notify, watch};

use crate::listener::{ListenerTask, next_connection_id, shutdown_requested};
use crate::{
    Connection, ConnectionEvents, ConnectionId, DEFAULT_MAX_FRAME_LEN, Transport,
    TransportError,
};

/// A TCP [`Transport`] that splits the inbound byte stream on a delimiter.
pub struct TcpTransport {
    addr: String,
    delimiter: u8,
    max_frame_len: usize,
    listener: Option<ListenerTask>,
}

impl TcpTransport {
    /// Creates a transport that will bind `addr` and frame on `delimiter`.
    pub fn new(addr: impl Into<String>, delimiter: u8) -> Self {
        Self {
            addr: addr.into(),
            delimiter,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            listener: None,
        }
    }

    /// Caps the size of one inbound frame. A peer that exceeds it is
    /// disconnected.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len.max(1);
        self
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;

    async fn start<E>(&mut self, events: Arc<E>) -> Result<(), TransportError>
    where
        E: ConnectionEvents<TcpConnection>,
    {
        if self.listener.is_some() {
            return Err(TransportError::AlreadyStarted);
        }

        let delimiter = self.delimiter;
        let max_frame_len = self.max_frame_len;
        let listener = ListenerTask::bind(&self.addr, move |stream, peer, shutdown| {
            serve_connection(
                stream,
                peer,
                Arc::clone(&events),
                delimiter,
                max_frame_len,
                shutdown,
            )
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

/// The write half of one accepted TCP connection.
pub struct TcpConnection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    local_addr: Option<SocketAddr>,
    writer: Mutex<OwnedWriteHalf>,
    closing: Arc<Notify>,
    closed: AtomicBool,
}

impl Connection for TcpConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed(self.id));
        }
        self.writer
            .lock()
            .await
            .write_all(data)
            .await
            .map_err(TransportError::SendFailed)
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // The reader task raises on_close once it sees this.
        self.closing.notify_one();
        match self.writer.lock().await.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(TransportError::SendFailed(e)),
        }
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

/// Outcome of reading one frame.
#[derive(Debug, PartialEq, Eq)]
enum FrameRead {
    /// A complete frame, delimiter included, is in the buffer.
    Frame,
    /// The peer closed the stream (a trailing partial frame is discarded).
    Eof,
    /// The peer sent more than `max_frame_len` bytes without a delimiter.
    TooLong,
}

async fn read_frame<R>(
    reader: &mut R,
    delimiter: u8,
    max_frame_len: usize,
    buf: &mut Vec<u8>,
) -> std::io::Result<FrameRead>
where
    R: AsyncBufRead + Unpin,
{
    let limit = max_frame_len as u64 + 1;
    let read = (&mut *reader).take(limit).read_until(delimiter, buf).await?;

    if read == 0 {
        Ok(FrameRead::Eof)
    } else if buf.last() == Some(&delimiter) {
        Ok(FrameRead::Frame)
    } else if buf.len() > max_frame_len {
        Ok(FrameRead::TooLong)
    } else {
        Ok(FrameRead::Eof)
    }
}

async fn serve_connection<E>(
    stream: TcpStream,
    peer_addr: SocketAddr,
    events: Arc<E>,
    delimiter: u8,
    max_frame_len: usize,
    mut shutdown: watch::Receiver<bool>,
) where
    E: ConnectionEvents<TcpConnection>,
{
    let local_addr = stream.local_addr().ok();
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(%peer_addr, error = %e, "failed to set TCP_NODELAY");
    }
    let (read_half, write_half) = stream.into_split();

    let id = next_connection_id();
    let closing = Arc::new(Notify::new());
    let conn = TcpConnection {
        id,
        peer_addr,
        local_addr,
        writer: Mutex::new(write_half),
        closing: Arc::clone(&closing),
        closed: AtomicBool::new(false),
    };
    tracing::debug!(conn = %id, %peer_addr, "accepted TCP connection");

    Arc::clone(&events).on_connect(conn).await;

    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::new();
    loop {
        let read = tokio::select! {
            _ = closing.notified() => {
                tracing::debug!(conn = %id, "connection closed locally");
                break;
            }
            _ = shutdown_requested(&mut shutdown) => {
                tracing::debug!(conn = %id, "closing connection for shutdown");
                break;
            }
            read = read_frame(&mut reader, delimiter, max_frame_len, &mut buf) => read,
        };

        match read {
            Ok(FrameRead::Frame) => {
                let frame = std::mem::take(&mut buf);
                Arc::clone(&events).on_frame(id, frame).await;
            }
            Ok(FrameRead::Eof) => {
                tracing::debug!(conn = %id, "connection closed by peer");
                break;
            }
            Ok(FrameRead::TooLong) => {
                tracing::warn!(
                    conn = %id,
                    max_frame_len,
                    "frame exceeds maximum length, dropping connection"
                );
                break;
            }
            Err(e) => {
                tracing::debug!(conn = %id, error = %e, "receive failed");
                break;
            }
        }
    }

    events.on_close(id).await;
}
