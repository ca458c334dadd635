//! Websocket driver: runs the handler, then makes sure the socket is closed.

use super::Dispatcher;
use crate::error::Error;
use crate::exchange::{Request, TeardownGuard, WebsocketExchange};
use crate::protocol::message::NORMAL_CLOSURE;

pub const PHASE_WEBSOCKET_HANDLER: &str = "websocket handler";

pub(crate) async fn drive(dispatcher: &Dispatcher, exchange: WebsocketExchange) {
    let _teardown = TeardownGuard::new(Request::Websocket(exchange.clone()));
    tracing::debug!(
        exchange_id = %exchange.id(),
        path = %exchange.info().path(),
        "Websocket exchange started"
    );

    let failure = match dispatcher.call_handler(Request::Websocket(exchange.clone())).await {
        Ok(None) => None,
        Ok(Some(_)) => Some(Error::Usage(
            "a websocket handler should return None; use send() and receive() to communicate",
        )),
        Err(err) if err.is_disconnect() => None,
        Err(err) => Some(err),
    };
    if let Some(err) = failure {
        dispatcher.report_failure(exchange.id(), PHASE_WEBSOCKET_HANDLER, &err);
    }

    // Not every host closes the socket when the handler returns.
    if let Err(e) = exchange.close(NORMAL_CLOSURE).await {
        tracing::trace!(exchange_id = %exchange.id(), error = %e, "Closing websocket after handler");
    }
}
