//! In-memory transport built on tokio channels.

use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::{mpsc, Mutex};

use super::{Transport, TransportError};
use crate::protocol::Message;

/// Adapter-side end of an in-memory connection.
pub struct ChannelTransport {
    inbound: Mutex<mpsc::UnboundedReceiver<Message>>,
    outbound: mpsc::UnboundedSender<Message>,
}

/// Server-side end: pushes inbound messages, collects outbound ones.
pub struct Peer {
    inbound: mpsc::UnboundedSender<Message>,
    outbound: mpsc::UnboundedReceiver<Message>,
}

/// Create a connected transport/peer pair.
pub fn channel() -> (ChannelTransport, Peer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    (
        ChannelTransport {
            inbound: Mutex::new(in_rx),
            outbound: out_tx,
        },
        Peer {
            inbound: in_tx,
            outbound: out_rx,
        },
    )
}

impl Transport for ChannelTransport {
    fn receive(&self) -> BoxFuture<'_, Result<Message, TransportError>> {
        async move {
            let mut inbound = self.inbound.lock().await;
            inbound.recv().await.ok_or(TransportError::Closed)
        }
        .boxed()
    }

    fn send(&self, message: Message) -> BoxFuture<'_, Result<(), TransportError>> {
        let result = self.outbound.send(message).map_err(|_| TransportError::Closed);
        async move { result }.boxed()
    }
}

impl Peer {
    /// Deliver a message to the adapter.
    pub fn send(&self, message: Message) -> Result<(), TransportError> {
        self.inbound.send(message).map_err(|_| TransportError::Closed)
    }

    /// Next message produced by the adapter, `None` once it dropped its end.
    pub async fn recv(&mut self) -> Option<Message> {
        self.outbound.recv().await
    }

    /// Split into the raw channel halves, for hosts that feed and drain
    /// from different tasks.
    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<Message>,
        mpsc::UnboundedReceiver<Message>,
    ) {
        (self.inbound, self.outbound)
    }
}
