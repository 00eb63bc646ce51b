//! Identity collaborators: who a token belongs to, and what they are called.
//!
//! Arcane doesn't implement authentication itself. The [`Authenticator`]
//! trait is a single async method that takes a token string and returns a
//! [`PrincipalId`] or an error; the auth handler calls it and flips the
//! session to authenticated on success. [`PlayerDirectory`] answers the
//! one question the chat handlers need: what to call a principal.

use std::future::Future;

use arcane_protocol::PrincipalId;

use crate::SessionError;

/// Validates a client's auth token and returns their identity.
///
/// # Example
///
/// ```rust
/// use arcane_protocol::PrincipalId;
/// use arcane_session::{Authenticator, SessionError};
///
/// /// Only lets in tokens with a known prefix.
/// struct PrefixAuthenticator;
///
/// impl Authenticator for PrefixAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<PrincipalId, SessionError> {
///         token
///             .strip_prefix("player:")
///             .map(PrincipalId::from)
///             .ok_or_else(|| SessionError::AuthFailed("unknown token format".into()))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates the given token and returns the principal it belongs to.
    ///
    /// # Returns
    /// - `Ok(PrincipalId)` — authentication succeeded
    /// - `Err(SessionError::AuthFailed)` — token is invalid or rejected
    fn authenticate(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<PrincipalId, SessionError>> + Send;
}

/// Development authenticator: any non-empty token is accepted and used as
/// the principal id.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllAuthenticator;

impl Authenticator for AcceptAllAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<PrincipalId, SessionError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SessionError::AuthFailed("empty token".into()));
        }
        Ok(PrincipalId::from(token))
    }
}

/// Looks up display data about players.
pub trait PlayerDirectory: Send + Sync + 'static {
    /// The username to show for `principal`. Never fails; implementations
    /// fall back to something presentable when the lookup misses.
    fn lookup_username(
        &self,
        principal: &PrincipalId,
    ) -> impl Future<Output = String> + Send;
}

/// A directory that has no data of its own and shows the principal id as
/// the username.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrincipalDirectory;

impl PlayerDirectory for PrincipalDirectory {
    async fn lookup_username(&self, principal: &PrincipalId) -> String {
        principal.to_string()
    }
}
