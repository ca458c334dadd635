//! Gateway protocol data types.
//!
//! # Data Flow
//! ```text
//! hosting server
//!     → Scope (one per connection: kind + immutable metadata)
//!     → Message stream (inbound: http.request, websocket.receive, ...)
//!     ← Message stream (outbound: http.response.*, websocket.send, ...)
//! ```
//!
//! # Design Decisions
//! - One `Message` enum for both directions, tagged by `type` on the wire
//! - Header lists stay as raw byte pairs; exchanges build maps lazily

pub mod message;
pub mod scope;

pub use message::Message;
pub use scope::{Scope, ScopeKind};
