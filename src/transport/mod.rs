//! Message transport between the adapter and the hosting server.
//!
//! # Responsibilities
//! - Define the two-call seam the hosting server implements
//! - Provide an in-memory channel implementation for hosts and tests
//!
//! # Design Decisions
//! - Object safe (boxed futures) so exchanges are not generic over it
//! - A dropped peer surfaces as [`TransportError::Closed`], which exchanges
//!   treat as a disconnect

pub mod channel;

use futures_util::future::BoxFuture;

use crate::protocol::Message;

pub use channel::{channel, ChannelTransport, Peer};

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The other side is gone; nothing more will be delivered.
    #[error("transport closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bidirectional message channel supplied by the hosting server.
pub trait Transport: Send + Sync + 'static {
    /// Consume the next inbound message, suspending until one arrives.
    fn receive(&self) -> BoxFuture<'_, Result<Message, TransportError>>;

    /// Enqueue an outbound message.
    fn send(&self, message: Message) -> BoxFuture<'_, Result<(), TransportError>>;
}
