//! Control-channel frame codec and message-type table.
//!
//! Every control frame is `8-byte header || payload`. The header is either an
//! exact 8-character token or a shorter token left-padded with `#` up to 8
//! bytes. The image stream deliberately skips this framing: its frames carry a
//! single marker byte followed by raw image bytes, a cheaper path for
//! high-volume data.

use crate::error::ProtocolError;

/// Fixed header width in bytes.
pub const HEADER_LEN: usize = 8;

/// Filler character used to left-pad short header tokens.
pub const PAD: u8 = b'#';

/// Known control-channel message types. New tokens go here; they can be at
/// most [`HEADER_LEN`] characters long.
pub mod token {
    /// A text message, payload `{sender, content}`.
    pub const MESSAGE: &str = "M";
    /// Authoritative message-log replacement, payload `{messages: [...]}`.
    pub const MESSAGE_SYNC: &str = "MSG_SYNC";
    /// Agent will accept a new prompt. Empty payload.
    pub const AGENT_READY: &str = "AGT_RDY";
    /// Agent is processing a prompt. Empty payload.
    pub const AGENT_BUSY: &str = "AGT_BUSY";
}

/// Encode a header token and payload into a single frame.
///
/// Fails with [`ProtocolError::HeaderTooLong`] before producing any output if
/// the token does not fit the fixed header width.
pub fn encode(token: &str, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if token.len() > HEADER_LEN {
        return Err(ProtocolError::HeaderTooLong {
            token: token.to_string(),
            max: HEADER_LEN,
        });
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.resize(HEADER_LEN - token.len(), PAD);
    frame.extend_from_slice(token.as_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Decode a frame into its header token and payload.
///
/// The `#` filler is stripped from the header to recover the logical token.
/// Inputs shorter than the header width are rejected.
pub fn decode(frame: &[u8]) -> Result<(String, &[u8]), ProtocolError> {
    if frame.len() < HEADER_LEN {
        return Err(ProtocolError::TruncatedFrame {
            len: frame.len(),
            min: HEADER_LEN,
        });
    }

    let header = std::str::from_utf8(&frame[..HEADER_LEN])
        .map_err(|_| ProtocolError::InvalidHeader)?;
    let token = header.trim_matches(PAD as char).to_string();
    Ok((token, &frame[HEADER_LEN..]))
}

/// Strip the leading marker byte from an image-stream frame, returning the
/// raw image bytes. The marker's value is not interpreted.
pub fn strip_image_marker(frame: &[u8]) -> Result<&[u8], ProtocolError> {
    if frame.len() <= 1 {
        return Err(ProtocolError::EmptyImageFrame);
    }
    Ok(&frame[1..])
}
