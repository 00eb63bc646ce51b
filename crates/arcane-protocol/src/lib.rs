//! Wire protocol for Arcane.
//!
//! This crate defines the "language" that clients and servers speak:
//!
//! - **Payloads** ([`Auth`], [`Chat`], [`Ping`], ...) — one struct per
//!   message kind.
//! - **Envelope** ([`Envelope`], [`Message`], [`MessageKind`]) — the
//!   tagged record that travels on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) and **framing**
//!   ([`encode_frame`], [`decode_frame`]) — how envelopes become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and session
//! (connection state). It doesn't know about connections; it only knows
//! how to serialize and deserialize messages.
//!
//! ```text
//! Transport (frames) → Protocol (Envelope) → Supervisor (dispatch)
//! ```

mod codec;
mod envelope;
mod error;
mod frame;
mod types;

pub use codec::{Codec, JsonCodec};
pub use envelope::{Envelope, Message, MessageKind};
pub use error::ProtocolError;
pub use frame::{DEFAULT_DELIMITER, decode_frame, encode_frame, strip_delimiter};
pub use types::{
    Auth, CharacterAction, CharacterCreate, CharacterDestroy, Chat, ChatColor, Disc, ObjCreate,
    ObjSync, Ping, PrincipalId, Variables,
};
