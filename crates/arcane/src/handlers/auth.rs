//! `Auth`: exchange a token for an identity.

use std::sync::Arc;

use arcane_protocol::{Auth, Chat, Envelope, Message, MessageKind};
use arcane_session::{Authenticator, PlayerDirectory};
use arcane_transport::Connection;
use tracing::info;

use super::unexpected;
use crate::dispatch::HandlerError;
use crate::supervisor::HandlerContext;

/// Authenticates the sender, echoes its `Auth` back as confirmation and
/// welcomes it to everyone.
///
/// A rejected token leaves the session unauthenticated and sends nothing.
pub async fn handle_auth<C, A, D>(
    ctx: HandlerContext<C>,
    envelope: Envelope,
    authenticator: Arc<A>,
    directory: Arc<D>,
) -> Result<(), HandlerError>
where
    C: Connection,
    A: Authenticator,
    D: PlayerDirectory,
{
    let kind = envelope.kind();
    let Message::Auth(Auth { token }) = envelope.into_message() else {
        return Err(unexpected(MessageKind::Auth, kind));
    };

    let principal = authenticator.authenticate(&token).await?;
    ctx.session().authenticate(principal.clone());
    info!(conn = %ctx.session().id(), principal = %principal, "session authenticated");

    ctx.reply(&Envelope::new(Auth { token })).await?;

    let username = directory.lookup_username(&principal).await;
    let welcome = Envelope::new(Chat::server(format!("Welcome, {username}!")));
    ctx.supervisor().broadcast(&welcome, &[]).await?;
    Ok(())
}
