//! Reference message handlers.
//!
//! [`build_default_handlers`] is the one place the default routes are
//! wired up:
//!
//! | Tag       | Auth required | Handler                 |
//! |-----------|---------------|-------------------------|
//! | `Auth`    | no            | [`auth::handle_auth`]   |
//! | `Chat`    | yes           | [`chat::handle_chat`]   |
//! | `Ping`    | no            | [`ping::handle_ping`]   |
//! | `ObjSync` | yes           | [`obj_sync::handle_obj_sync`] |
//!
//! Games that need more routes start from this registry and
//! [`register`](HandlerRegistry::register) their own on top.

pub mod auth;
pub mod chat;
pub mod obj_sync;
pub mod ping;

use std::sync::Arc;

use arcane_protocol::MessageKind;
use arcane_session::{Authenticator, PlayerDirectory};
use arcane_transport::Connection;

use crate::dispatch::{HandlerError, HandlerRegistry};
use crate::supervisor::HandlerContext;

/// Builds the registry with the reference Auth, Chat, Ping and ObjSync
/// handlers.
pub fn build_default_handlers<C, A, D>(
    authenticator: Arc<A>,
    directory: Arc<D>,
) -> HandlerRegistry<HandlerContext<C>>
where
    C: Connection,
    A: Authenticator,
    D: PlayerDirectory,
{
    let mut handlers: HandlerRegistry<HandlerContext<C>> = HandlerRegistry::new();

    let auth_directory = Arc::clone(&directory);
    handlers.register(MessageKind::Auth, false, move |ctx, envelope| {
        auth::handle_auth(
            ctx,
            envelope,
            Arc::clone(&authenticator),
            Arc::clone(&auth_directory),
        )
    });

    handlers.register(MessageKind::Chat, true, move |ctx, envelope| {
        chat::handle_chat(ctx, envelope, Arc::clone(&directory))
    });

    handlers.register(MessageKind::Ping, false, ping::handle_ping);
    handlers.register(MessageKind::ObjSync, true, obj_sync::handle_obj_sync);

    handlers
}

fn unexpected(expected: MessageKind, actual: MessageKind) -> HandlerError {
    HandlerError::UnexpectedPayload { expected, actual }
}
