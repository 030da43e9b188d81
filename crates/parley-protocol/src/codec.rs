//! Codec for encoding and decoding Parley events.
//!
//! Events travel as JSON text frames, one event per WebSocket message.

use thiserror::Error;

use crate::events::{ClientEvent, ServerEvent};

/// Default maximum inbound frame size (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds the configured maximum size.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Size of the offending frame.
        size: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// JSON encoding/decoding error, including unknown `type` tags.
    #[error("Malformed event: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Encode a server event to a JSON text frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(event: &ServerEvent) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(event)?)
}

/// Decode a client event from a JSON text frame, using the default
/// [`MAX_FRAME_SIZE`] ceiling.
///
/// Unknown event types and missing fields decode to
/// [`ProtocolError::Malformed`]; callers ignore these rather than
/// closing the connection.
///
/// # Errors
///
/// Returns an error if the frame is too large or not a valid event.
pub fn decode(text: &str) -> Result<ClientEvent, ProtocolError> {
    decode_with_limit(text, MAX_FRAME_SIZE)
}

/// Decode a client event with a configurable frame-size ceiling.
///
/// # Errors
///
/// Returns an error if the frame exceeds `max_size` or is not a valid
/// event.
pub fn decode_with_limit(text: &str, max_size: usize) -> Result<ClientEvent, ProtocolError> {
    if text.len() > max_size {
        return Err(ProtocolError::FrameTooLarge {
            size: text.len(),
            max: max_size,
        });
    }
    Ok(serde_json::from_str(text)?)
}
