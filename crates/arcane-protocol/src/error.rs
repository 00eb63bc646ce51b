//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means the problem is in turning messages into
//! bytes or back, never in networking or session state.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    ///
    /// For envelopes built by the server itself this is a programming
    /// error, and callers treat it as fatal for the operation.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust value).
    ///
    /// Common causes: malformed JSON, an unknown `tag`, or a `payload`
    /// whose shape does not match its tag.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The frame is invalid at the protocol level, e.g. it is empty once
    /// the delimiter is stripped.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
