//! Handler registry: routes each envelope to the callback for its tag.
//!
//! Handlers are registered once, during composition, with a flag saying
//! whether the sender must be authenticated. Dispatch then does three
//! things, in order:
//!
//! 1. no registration for the tag → [`DispatchError::HandlerNotFound`]
//! 2. auth required but the sender isn't authenticated →
//!    [`DispatchError::Unauthorized`], callback not invoked
//! 3. otherwise the callback runs and its result is passed through
//!
//! Registration needs `&mut self`, so it can only happen before the
//! registry is shared with the running server.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use arcane_protocol::{Envelope, MessageKind};
use arcane_session::SessionError;
use futures_util::future::BoxFuture;

use crate::ArcaneError;

/// Anything dispatch can ask "is the sender authenticated?".
pub trait Authenticated {
    fn is_authenticated(&self) -> bool;
}

/// Why a handler failed.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The envelope's payload was not the kind the handler was registered
    /// for.
    #[error("expected a {expected} payload, got {actual}")]
    UnexpectedPayload {
        expected: MessageKind,
        actual: MessageKind,
    },

    /// The handler refused the message.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Authentication or session lookup failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Sending a reply or broadcast failed.
    #[error(transparent)]
    Server(#[from] ArcaneError),
}

/// Why dispatch did not complete successfully.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no handler registered for {0}")]
    HandlerNotFound(MessageKind),

    #[error("{0} requires authentication")]
    Unauthorized(MessageKind),

    #[error("{kind} handler failed: {source}")]
    Handler {
        kind: MessageKind,
        #[source]
        source: HandlerError,
    },
}

/// The boxed future every callback returns.
pub type HandlerFuture = BoxFuture<'static, Result<(), HandlerError>>;

type Callback<X> = Arc<dyn Fn(X, Envelope) -> HandlerFuture + Send + Sync>;

struct Registration<X> {
    requires_auth: bool,
    callback: Callback<X>,
}

/// Static mapping from tag to (auth requirement, callback).
///
/// `X` is the context handed to every callback; the server uses
/// [`HandlerContext`](crate::HandlerContext).
pub struct HandlerRegistry<X> {
    handlers: HashMap<MessageKind, Registration<X>>,
}

impl<X> HandlerRegistry<X>
where
    X: Authenticated + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers `callback` for `kind`. Registering a kind twice replaces
    /// the earlier handler.
    pub fn register<F, Fut>(
        &mut self,
        kind: MessageKind,
        requires_auth: bool,
        callback: F,
    ) -> &mut Self
    where
        F: Fn(X, Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let callback: Callback<X> = Arc::new(move |ctx: X, envelope: Envelope| -> HandlerFuture {
            Box::pin(callback(ctx, envelope))
        });
        let registration = Registration {
            requires_auth,
            callback,
        };

        if self.handlers.insert(kind, registration).is_some() {
            tracing::warn!(
                tag = %kind,
                requires_auth,
                "handler replaced an existing registration"
            );
        } else {
            tracing::debug!(tag = %kind, requires_auth, "handler registered");
        }
        self
    }

    pub fn contains(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Whether `kind` requires authentication, or `None` if unregistered.
    pub fn requires_auth(&self, kind: MessageKind) -> Option<bool> {
        self.handlers.get(&kind).map(|r| r.requires_auth)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Routes `envelope` to its handler.
    pub async fn dispatch(&self, ctx: X, envelope: Envelope) -> Result<(), DispatchError> {
        let kind = envelope.kind();
        let registration = self
            .handlers
            .get(&kind)
            .ok_or(DispatchError::HandlerNotFound(kind))?;

        if registration.requires_auth && !ctx.is_authenticated() {
            return Err(DispatchError::Unauthorized(kind));
        }

        (registration.callback)(ctx, envelope)
            .await
            .map_err(|source| DispatchError::Handler { kind, source })
    }
}

impl<X> Default for HandlerRegistry<X>
where
    X: Authenticated + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<X> fmt::Debug for HandlerRegistry<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("HandlerRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use arcane_protocol::{Auth, Chat, Disc, Ping};

    use super::*;

    /// A bare context whose auth state the test controls.
    struct Caller {
        authenticated: bool,
    }

    impl Authenticated for Caller {
        fn is_authenticated(&self) -> bool {
            self.authenticated
        }
    }

    fn anon() -> Caller {
        Caller {
            authenticated: false,
        }
    }

    fn authed() -> Caller {
        Caller { authenticated: true }
    }

    fn counting(
        registry: &mut HandlerRegistry<Caller>,
        kind: MessageKind,
        requires_auth: bool,
    ) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        registry.register(kind, requires_auth, move |_ctx, _envelope| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), HandlerError>(())
            }
        });
        calls
    }

    #[tokio::test]
    async fn test_dispatch_invokes_registered_callback_once() {
        let mut registry = HandlerRegistry::new();
        let ping_calls = counting(&mut registry, MessageKind::Ping, false);
        let disc_calls = counting(&mut registry, MessageKind::Disc, false);

        registry
            .dispatch(anon(), Envelope::new(Ping { sent_time: 1 }))
            .await
            .unwrap();

        assert_eq!(ping_calls.load(Ordering::SeqCst), 1);
        assert_eq!(disc_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispatch_unregistered_tag_returns_handler_not_found() {
        let mut registry = HandlerRegistry::new();
        let calls = counting(&mut registry, MessageKind::Ping, false);

        let result = registry
            .dispatch(
                authed(),
                Envelope::new(Disc {
                    reason: "x".into(),
                }),
            )
            .await;

        assert!(matches!(
            result,
            Err(DispatchError::HandlerNotFound(MessageKind::Disc))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispatch_auth_required_unauthenticated_is_rejected() {
        let mut registry = HandlerRegistry::new();
        let calls = counting(&mut registry, MessageKind::Chat, true);
        let chat = || Envelope::new(Chat::server("hi"));

        let denied = registry.dispatch(anon(), chat()).await;
        assert!(matches!(
            denied,
            Err(DispatchError::Unauthorized(MessageKind::Chat))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        registry.dispatch(authed(), chat()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_propagates_handler_error() {
        let mut registry: HandlerRegistry<Caller> = HandlerRegistry::new();
        registry.register(MessageKind::Auth, false, |_ctx, _envelope| async {
            Err::<(), _>(HandlerError::Rejected("banned".into()))
        });

        let result = registry
            .dispatch(
                anon(),
                Envelope::new(Auth {
                    token: "t".into(),
                }),
            )
            .await;

        match result {
            Err(DispatchError::Handler {
                kind: MessageKind::Auth,
                source: HandlerError::Rejected(reason),
            }) => assert_eq!(reason, "banned"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_register_same_kind_twice_last_wins() {
        let mut registry = HandlerRegistry::new();
        let first = counting(&mut registry, MessageKind::Ping, true);
        let second = counting(&mut registry, MessageKind::Ping, false);

        // The replacement's auth flag applies too.
        registry
            .dispatch(anon(), Envelope::new(Ping { sent_time: 1 }))
            .await
            .unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_callback_receives_the_envelope() {
        let mut registry: HandlerRegistry<Caller> = HandlerRegistry::new();
        registry.register(MessageKind::Ping, false, |_ctx, envelope| async move {
            match envelope.message() {
                arcane_protocol::Message::Ping(ping) if ping.sent_time == 42 => Ok(()),
                _ => Err(HandlerError::Rejected("wrong envelope".into())),
            }
        });

        let result = registry
            .dispatch(anon(), Envelope::new(Ping { sent_time: 42 }))
            .await;

        assert!(result.is_ok());
    }

    #[test]
    fn test_requires_auth_and_contains() {
        let mut registry = HandlerRegistry::new();
        counting(&mut registry, MessageKind::Chat, true);
        counting(&mut registry, MessageKind::Ping, false);

        assert!(registry.contains(MessageKind::Chat));
        assert!(!registry.contains(MessageKind::ObjSync));
        assert_eq!(registry.requires_auth(MessageKind::Chat), Some(true));
        assert_eq!(registry.requires_auth(MessageKind::Ping), Some(false));
        assert_eq!(registry.requires_auth(MessageKind::Disc), None);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_debug_lists_registered_kinds() {
        let mut registry = HandlerRegistry::new();
        counting(&mut registry, MessageKind::Ping, false);
        counting(&mut registry, MessageKind::Auth, false);

        assert_eq!(
            format!("{registry:?}"),
            "HandlerRegistry { kinds: [Auth, Ping] }"
        );
    }
}
