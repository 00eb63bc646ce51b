//! # Arcane
//!
//! Session and protocol layer for real-time multiplayer game servers.
//!
//! Arcane accepts persistent connections, turns each inbound frame into a
//! typed [`Envelope`], routes it to the handler registered for its tag and
//! delivers replies to one player or to everyone. A background heartbeat
//! evicts players that have gone quiet.
//!
//! ```text
//! Transport ──→ Supervisor ──→ HandlerRegistry ──→ handler
//!     ↑             │  ↑                              │
//!     └── send ─────┘  └──── send_to / broadcast ─────┘
//!                   ↑
//!          HeartbeatMonitor (kick on timeout)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use arcane::prelude::*;
//!
//! # async fn run() -> Result<(), ArcaneError> {
//! let mut server = Server::builder()
//!     .bind("0.0.0.0:6543")
//!     .heartbeat(HeartbeatConfig::default())
//!     .build();
//!
//! server.start().await?;
//! tokio::signal::ctrl_c().await.ok();
//! server.stop().await
//! # }
//! ```

mod config;
mod dispatch;
mod error;
pub mod handlers;
mod server;
mod supervisor;

#[cfg(test)]
mod test_support;

pub use config::{DEFAULT_BIND_ADDR, ServerConfig};
pub use dispatch::{Authenticated, DispatchError, HandlerError, HandlerFuture, HandlerRegistry};
pub use error::ArcaneError;
pub use handlers::build_default_handlers;
pub use server::{LifecycleState, Server, ServerBuilder};
pub use supervisor::{BootstrapHook, HandlerContext, Supervisor};

// Re-exports from sub-crates so users only need to depend on `arcane`.
pub use arcane_heartbeat::{HeartbeatConfig, HeartbeatError, LIVENESS_TIMEOUT_REASON, Liveness};
pub use arcane_protocol::{
    Auth, CharacterAction, CharacterCreate, CharacterDestroy, Chat, ChatColor, Codec, Disc,
    Envelope, JsonCodec, Message, MessageKind, ObjCreate, ObjSync, Ping, PrincipalId,
    ProtocolError, Variables,
};
pub use arcane_session::{
    AcceptAllAuthenticator, Authenticator, ConnectionRegistry, PlayerDirectory,
    PrincipalDirectory, Session, SessionError,
};
pub use arcane_transport::{Connection, ConnectionId, Transport, TransportError};
#[cfg(feature = "websocket")]
pub use arcane_transport::{WebSocketConnection, WebSocketTransport};
pub use arcane_transport::{TcpConnection, TcpTransport};

/// Convenience re-exports for the common case.
///
/// ```rust
/// use arcane::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        AcceptAllAuthenticator, ArcaneError, Auth, Authenticator, Chat, ChatColor, Connection,
        ConnectionId, Disc, Envelope, HandlerContext, HandlerError, HandlerRegistry,
        HeartbeatConfig, LifecycleState, Message, MessageKind, ObjSync, Ping, PlayerDirectory,
        PrincipalDirectory, PrincipalId, Server, ServerBuilder, ServerConfig, Session,
        SessionError, build_default_handlers,
    };
}
