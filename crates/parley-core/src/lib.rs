//! # parley-core
//!
//! Presence, typing state, and the room broadcast engine for the Parley
//! chat server.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Registry** - single source of truth for which connection is in which room
//! - **TypingTracker** - ephemeral per-room set of names currently composing
//! - **RoomEngine** - orchestrates join/send/typing/leave and fans events out
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Session   │────▶│ RoomEngine  │────▶│  Registry   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │            ┌─────────────┐
//!                            ├───────────▶│TypingTracker│
//!                            │            └─────────────┘
//!                            ▼
//!                     ┌─────────────┐
//!                     │MessageStore │
//!                     └─────────────┘
//! ```

pub mod engine;
pub mod presence;
pub mod typing;

pub use engine::{EngineError, EngineStats, EventSink, RoomEngine};
pub use presence::{ConnectionId, ConnectionRecord, Registry};
pub use typing::TypingTracker;
