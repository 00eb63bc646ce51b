//! Payload types for Arcane's wire format.
//!
//! Every struct here is the `payload` of one message kind. Field names on
//! the wire are PascalCase (`SentTime`, `Content`), with the identifier
//! fields spelled `ObjectID`, `AreaID` and `ClientID`.

use std::fmt;
use std::str::FromStr;

use arcane_transport::ConnectionId;
use serde::{Deserialize, Deserializer, Serialize};

/// Free-form key/value data carried by sync and action messages.
pub type Variables = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The identity a session authenticated as.
///
/// Opaque to this layer: whatever the session layer's authenticator
/// hands back. It is serialized as a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PrincipalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for PrincipalId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Chat colors
// ---------------------------------------------------------------------------

/// How a client should render a chat line.
///
/// Note the odd one out: server notices are spelled `"Server"` on the wire,
/// the rest are lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChatColor {
    /// Player-sent messages.
    #[default]
    #[serde(rename = "default")]
    Default,
    /// Game-related messages such as NPC dialogue.
    #[serde(rename = "game")]
    Game,
    /// Moderator-sent messages.
    #[serde(rename = "moderator")]
    Moderator,
    /// Server notices (welcome, kick).
    #[serde(rename = "Server")]
    Server,
}

impl ChatColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Game => "game",
            Self::Moderator => "moderator",
            Self::Server => "Server",
        }
    }
}

impl FromStr for ChatColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "game" => Ok(Self::Game),
            "moderator" => Ok(Self::Moderator),
            "Server" => Ok(Self::Server),
            other => Err(format!("unknown chat color `{other}`")),
        }
    }
}

impl fmt::Display for ChatColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clients often leave the color blank; treat `""` (and `null`) as the
/// default color instead of rejecting the whole message.
fn color_or_default<'de, D>(deserializer: D) -> Result<ChatColor, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)?.as_deref() {
        None | Some("") => Ok(ChatColor::Default),
        Some(other) => other.parse().map_err(serde::de::Error::custom),
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Client → Server: authenticate with an opaque token. Echoed back on
/// success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Auth {
    pub token: String,
}

/// A chat line. Clients send one, the server rebroadcasts it with the
/// author filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Chat {
    #[serde(default)]
    pub author: String,
    pub content: String,
    #[serde(default, deserialize_with = "color_or_default")]
    pub color: ChatColor,
}

impl Chat {
    /// A notice from the server itself.
    pub fn server(content: impl Into<String>) -> Self {
        Self {
            author: "Server".to_owned(),
            content: content.into(),
            color: ChatColor::Server,
        }
    }
}

/// Server → Client: you are being disconnected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Disc {
    pub reason: String,
}

/// Latency check. `SentTime` is milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ping {
    pub sent_time: i64,
}

/// Synchronize variables of one object amongst clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjSync {
    #[serde(rename = "ObjectID")]
    pub object_id: String,
    #[serde(rename = "AreaID")]
    pub area_id: String,
    #[serde(default)]
    pub variables: Variables,
}

/// Create a new instance of a synchronized object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjCreate {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "ObjectID")]
    pub object_id: String,
    #[serde(rename = "AreaID")]
    pub area_id: String,
    pub x: i64,
    pub y: i64,
    pub depth: i64,
}

/// Create a character owned by a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CharacterCreate {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "ClientID")]
    pub client_id: ConnectionId,
    pub x: i64,
    pub y: i64,
}

/// Destroy a client's character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CharacterDestroy {
    #[serde(rename = "ClientID")]
    pub client_id: ConnectionId,
}

/// Run an action on behalf of a client's character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CharacterAction {
    #[serde(rename = "ClientID")]
    pub client_id: ConnectionId,
    pub action: String,
    #[serde(default)]
    pub details: Variables,
}

// =========================================================================
// Tests
// =========================================================================
