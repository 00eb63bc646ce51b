//! `Chat`: relay a line of chat to every player.

use std::sync::Arc;

use arcane_protocol::{Chat, Envelope, Message, MessageKind};
use arcane_session::PlayerDirectory;
use arcane_transport::Connection;
use tracing::debug;

use super::unexpected;
use crate::dispatch::HandlerError;
use crate::supervisor::HandlerContext;

/// Rebroadcasts the message to everyone, sender included.
///
/// The author is whatever the directory calls the sender's principal; the
/// `Author` field a client sends is ignored.
pub async fn handle_chat<C, D>(
    ctx: HandlerContext<C>,
    envelope: Envelope,
    directory: Arc<D>,
) -> Result<(), HandlerError>
where
    C: Connection,
    D: PlayerDirectory,
{
    let kind = envelope.kind();
    let Message::Chat(Chat { content, color, .. }) = envelope.into_message() else {
        return Err(unexpected(MessageKind::Chat, kind));
    };
    let Some(principal) = ctx.session().principal() else {
        return Err(HandlerError::Rejected("chat from unauthenticated session".into()));
    };

    let author = directory.lookup_username(&principal).await;
    debug!(conn = %ctx.session().id(), author = %author, "chat message");

    let relay = Envelope::new(Chat {
        author,
        content,
        color,
    });
    ctx.supervisor().broadcast(&relay, &[]).await?;
    Ok(())
}
