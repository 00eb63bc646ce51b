//! The message union and the envelope that carries it on the wire.
//!
//! On the wire every record is a JSON object with two fields:
//!
//! ```text
//! {"tag": "Ping", "payload": {"SentTime": 1000}}
//! ```
//!
//! `tag` names a [`MessageKind`] and selects the shape of `payload`. The
//! set of kinds is closed: a record with an unknown tag, or a payload that
//! does not fit its tag, fails to decode instead of reaching a handler.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{
    Auth, CharacterAction, CharacterCreate, CharacterDestroy, Chat, Disc, ObjCreate, ObjSync,
    Ping,
};

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// The closed set of message tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageKind {
    Auth,
    Chat,
    Disc,
    Ping,
    ObjSync,
    ObjCreate,
    CharacterCreate,
    CharacterDestroy,
    CharacterAction,
}

impl MessageKind {
    /// Every kind, in declaration order.
    pub const ALL: [MessageKind; 9] = [
        Self::Auth,
        Self::Chat,
        Self::Disc,
        Self::Ping,
        Self::ObjSync,
        Self::ObjCreate,
        Self::CharacterCreate,
        Self::CharacterDestroy,
        Self::CharacterAction,
    ];

    /// The tag string used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "Auth",
            Self::Chat => "Chat",
            Self::Disc => "Disc",
            Self::Ping => "Ping",
            Self::ObjSync => "ObjSync",
            Self::ObjCreate => "ObjCreate",
            Self::CharacterCreate => "CharacterCreate",
            Self::CharacterDestroy => "CharacterDestroy",
            Self::CharacterAction => "CharacterAction",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown message tag `{s}`"))
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A decoded payload, one variant per [`MessageKind`].
///
/// Adjacently tagged, so the variant name lands in `tag` and the struct in
/// `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", content = "payload")]
pub enum Message {
    Auth(Auth),
    Chat(Chat),
    Disc(Disc),
    Ping(Ping),
    ObjSync(ObjSync),
    ObjCreate(ObjCreate),
    CharacterCreate(CharacterCreate),
    CharacterDestroy(CharacterDestroy),
    CharacterAction(CharacterAction),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Auth(_) => MessageKind::Auth,
            Self::Chat(_) => MessageKind::Chat,
            Self::Disc(_) => MessageKind::Disc,
            Self::Ping(_) => MessageKind::Ping,
            Self::ObjSync(_) => MessageKind::ObjSync,
            Self::ObjCreate(_) => MessageKind::ObjCreate,
            Self::CharacterCreate(_) => MessageKind::CharacterCreate,
            Self::CharacterDestroy(_) => MessageKind::CharacterDestroy,
            Self::CharacterAction(_) => MessageKind::CharacterAction,
        }
    }
}

macro_rules! impl_from_payload {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Message {
                fn from(payload: $variant) -> Self {
                    Message::$variant(payload)
                }
            }
        )*
    };
}

impl_from_payload!(
    Auth,
    Chat,
    Disc,
    Ping,
    ObjSync,
    ObjCreate,
    CharacterCreate,
    CharacterDestroy,
    CharacterAction,
);

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The unit of exchange: a tag plus its payload.
///
/// The tag is fixed by the payload at construction and cannot change
/// afterwards; the envelope is immutable and can be shared across tasks
/// while it is being sent.
///
/// ```rust
/// use arcane_protocol::{Envelope, MessageKind, Ping};
///
/// let envelope = Envelope::new(Ping { sent_time: 1000 });
/// assert_eq!(envelope.kind(), MessageKind::Ping);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope {
    message: Message,
}

impl Envelope {
    /// Wraps a payload, deriving the tag from its kind.
    pub fn new(message: impl Into<Message>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The envelope's tag.
    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }
}

impl From<Message> for Envelope {
    fn from(message: Message) -> Self {
        Self { message }
    }
}

// =========================================================================
// Tests
// =========================================================================
