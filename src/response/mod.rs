//! Response shapes and their normalization.
//!
//! # Data Flow
//! ```text
//! handler return value (Response)
//!     → normalize.rs (status, headers, body) with defaults filled in
//!     → body.rs guess_content_type (when no content-type was given)
//!     → body.rs materialize (bytes, or a lazy chunk stream)
//!     → HTTP exchange driver
//! ```
//!
//! # Design Decisions
//! - Typed variants for the common shapes, `Parts` for loosely built ones
//! - Lazy bodies are async streams only; blocking iterators have no
//!   constructor
//! - Normalization never polls a lazy body

pub mod body;
pub mod normalize;

pub use body::{guess_content_type, materialize, Body, Chunk, ChunkStream, JsonBody, Payload};
pub use normalize::{normalize, Normalized, Part, Response};
