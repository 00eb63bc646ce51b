//! Session management for Arcane.
//!
//! This crate holds the per-connection state the server keeps between
//! frames:
//!
//! 1. **Sessions** — one [`Session`] per live connection: its write
//!    handle, who it authenticated as, and when it last spoke
//! 2. **Registry** — the [`ConnectionRegistry`] of every live session
//! 3. **Identity hooks** — the [`Authenticator`] and [`PlayerDirectory`]
//!    collaborator traits
//!
//! # How it fits in the stack
//!
//! ```text
//! Supervisor (above)  ← creates, looks up and evicts sessions
//!     ↕
//! Session Layer (this crate)  ← connection identity and liveness state
//!     ↕
//! Transport / Protocol (below)  ← ConnectionId, Connection, PrincipalId
//! ```

mod auth;
mod error;
mod registry;
mod session;

pub use auth::{AcceptAllAuthenticator, Authenticator, PlayerDirectory, PrincipalDirectory};
pub use error::SessionError;
pub use registry::ConnectionRegistry;
pub use session::{Session, UNKNOWN_PLAYER};
