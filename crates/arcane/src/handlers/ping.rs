//! `Ping`: latency check.

use std::time::{SystemTime, UNIX_EPOCH};

use arcane_protocol::{Envelope, Message, MessageKind, Ping};
use arcane_transport::Connection;
use tracing::debug;

use super::unexpected;
use crate::dispatch::HandlerError;
use crate::supervisor::HandlerContext;

/// Replies to the sender with the server's current wall-clock time.
pub async fn handle_ping<C: Connection>(
    ctx: HandlerContext<C>,
    envelope: Envelope,
) -> Result<(), HandlerError> {
    let kind = envelope.kind();
    let Message::Ping(Ping { sent_time }) = envelope.into_message() else {
        return Err(unexpected(MessageKind::Ping, kind));
    };

    let now = now_ms();
    debug!(
        conn = %ctx.session().id(),
        latency_ms = now.saturating_sub(sent_time),
        "ping"
    );

    ctx.reply(&Envelope::new(Ping { sent_time: now })).await?;
    Ok(())
}

/// Milliseconds since the Unix epoch.
fn now_ms() -> i64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(since_epoch.as_millis()).unwrap_or(i64::MAX)
}
