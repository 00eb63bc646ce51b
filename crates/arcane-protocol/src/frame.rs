//! Delimiter framing on top of a [`Codec`].
//!
//! Stream transports split inbound bytes on a delimiter and hand the frame
//! over with the delimiter still attached. These helpers add it on the way
//! out and strip it (plus a stray `\r` from CRLF clients) on the way in.

use crate::{Codec, Envelope, ProtocolError};

/// The default frame delimiter.
pub const DEFAULT_DELIMITER: u8 = b'\n';

/// Serializes `envelope` and appends `delimiter`.
///
/// The result is ready to write as-is, and can be reused for every
/// recipient of a broadcast.
pub fn encode_frame<C: Codec>(
    codec: &C,
    envelope: &Envelope,
    delimiter: u8,
) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = codec.encode(envelope)?;
    bytes.push(delimiter);
    Ok(bytes)
}

/// Removes one trailing `delimiter` and, when the delimiter is `\n`, a `\r`
/// in front of it.
pub fn strip_delimiter(frame: &[u8], delimiter: u8) -> &[u8] {
    let Some(body) = frame.strip_suffix(&[delimiter]) else {
        return frame;
    };
    if delimiter == b'\n' {
        body.strip_suffix(b"\r").unwrap_or(body)
    } else {
        body
    }
}

/// Strips the delimiter and decodes what is left as an [`Envelope`].
///
/// # Errors
/// `InvalidMessage` for a frame that is empty (or only whitespace) once the
/// delimiter is gone, otherwise whatever the codec reports.
pub fn decode_frame<C: Codec>(
    codec: &C,
    frame: &[u8],
    delimiter: u8,
) -> Result<Envelope, ProtocolError> {
    let body = strip_delimiter(frame, delimiter);
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ProtocolError::InvalidMessage("empty frame".into()));
    }
    codec.decode(body)
}
