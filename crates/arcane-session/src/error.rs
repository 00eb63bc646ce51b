//! Error types for the session layer.

/// Errors that can occur while authenticating a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Authentication failed: the token was invalid, expired, or rejected
    /// by the [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),
}
