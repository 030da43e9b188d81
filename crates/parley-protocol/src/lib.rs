//! # parley-protocol
//!
//! Wire protocol definitions for the Parley chat server.
//!
//! This crate defines the JSON event protocol spoken between clients and
//! the server over the WebSocket, plus the `ChatMessage` record shared by
//! the message store and the room engine.
//!
//! ## Event Types
//!
//! - `ClientEvent` - inbound: `join`, `sendMessage`, `typing`, `stopTyping`, `leaveRoom`
//! - `ServerEvent` - outbound: `message`, `chatHistory`, `roomData`, `typingStatus`
//!
//! ## Example
//!
//! ```rust
//! use parley_protocol::{codec, ClientEvent};
//!
//! let event = codec::decode(r#"{"type":"sendMessage","text":"hi"}"#).unwrap();
//! assert!(matches!(event, ClientEvent::SendMessage { .. }));
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode, decode_with_limit, encode, ProtocolError};
pub use events::{ChatMessage, ClientEvent, Member, ServerEvent, SYSTEM_AUTHOR};
