//! `ObjSync`: fan object state out to the other players.

use arcane_protocol::{Envelope, MessageKind};
use arcane_transport::Connection;
use tracing::trace;

use super::unexpected;
use crate::dispatch::HandlerError;
use crate::supervisor::HandlerContext;

/// Rebroadcasts the envelope unchanged to everyone but the sender.
pub async fn handle_obj_sync<C: Connection>(
    ctx: HandlerContext<C>,
    envelope: Envelope,
) -> Result<(), HandlerError> {
    if envelope.kind() != MessageKind::ObjSync {
        return Err(unexpected(MessageKind::ObjSync, envelope.kind()));
    }

    let sender = ctx.session().id();
    let delivered = ctx.supervisor().broadcast(&envelope, &[sender]).await?;
    trace!(conn = %sender, delivered, "object sync relayed");
    Ok(())
}
