//! Lifespan handshake: acknowledge startup, then shutdown.

use crate::observability::{Event, Reporter};
use crate::protocol::Message;
use crate::transport::{Transport, TransportError};

/// Answer `lifespan.startup` and `lifespan.shutdown`; returns after
/// shutdown is acknowledged or the transport closes.
pub(crate) async fn run(reporter: &dyn Reporter, transport: &dyn Transport) {
    loop {
        let message = match transport.receive().await {
            Ok(message) => message,
            Err(TransportError::Closed) => {
                tracing::debug!("Lifespan transport closed");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Lifespan transport failed");
                return;
            }
        };
        match message {
            Message::LifespanStartup => {
                reporter.report(&Event::LifespanStartup);
                if transport.send(Message::LifespanStartupComplete).await.is_err() {
                    return;
                }
            }
            Message::LifespanShutdown => {
                reporter.report(&Event::LifespanShutdown);
                let _ = transport.send(Message::LifespanShutdownComplete).await;
                return;
            }
            other => reporter.report(&Event::UnknownLifespanMessage(other.kind().to_string())),
        }
    }
}
