//! HTTP driver: runs the handler and sends whatever it returned.
//!
//! # Data Flow
//! ```text
//! handler(Request::Http)
//!     → returned a response?  normalize → content-type default
//!         full body  → accept (+content-length) → one final chunk
//!         stream     → accept on first chunk → chunks → final empty chunk
//!     → used the exchange?    must return None; finish if still open
//! ```
//!
//! # Failure handling
//! - Before headers: error response `"<Kind> in <phase>: <message>"`
//! - After headers: zero-length final chunk, error reported only
//! - Disconnects are not failures

use std::panic::AssertUnwindSafe;

use ::http::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use ::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use futures_util::{FutureExt, StreamExt};

use super::{panic_error, Dispatcher};
use crate::error::{Error, Result};
use crate::exchange::{AppState, HttpExchange, Request, TeardownGuard};
use crate::response::{guess_content_type, materialize, normalize, ChunkStream, Payload};

pub const PHASE_REQUEST_HANDLER: &str = "request handler";
pub const PHASE_PROCESSING_OUTPUT: &str = "processing handler output";
pub const PHASE_SENDING_RESPONSE: &str = "sending response";
pub const PHASE_SENDING_CHUNKED: &str = "sending chunked response";
pub const PHASE_FINALIZING: &str = "finalizing response";

type Failure = (&'static str, Error);

pub(crate) async fn drive(dispatcher: &Dispatcher, exchange: HttpExchange) {
    let _teardown = TeardownGuard::new(Request::Http(exchange.clone()));
    tracing::debug!(
        exchange_id = %exchange.id(),
        method = exchange.info().method(),
        path = %exchange.info().path(),
        "HTTP exchange started"
    );

    if let Err((phase, err)) = respond(dispatcher, &exchange).await {
        fail(dispatcher, &exchange, phase, err).await;
    }
}

async fn respond(dispatcher: &Dispatcher, exchange: &HttpExchange) -> std::result::Result<(), Failure> {
    let result = dispatcher
        .call_handler(Request::Http(exchange.clone()))
        .await
        .map_err(|e| (PHASE_REQUEST_HANDLER, e))?;

    if exchange.app_state() == AppState::BeforeHeaders {
        let response = result.ok_or_else(|| {
            (
                PHASE_PROCESSING_OUTPUT,
                Error::BodyType("body cannot be empty; return a response or call accept_response()".to_string()),
            )
        })?;
        let (status, headers, payload) = prepare(response).map_err(|e| (PHASE_PROCESSING_OUTPUT, e))?;
        match payload {
            Payload::Full(body) => send_full(exchange, status, headers, body)
                .await
                .map_err(|e| (PHASE_SENDING_RESPONSE, e))?,
            Payload::Streaming(stream) => send_stream(exchange, status, headers, stream)
                .await
                .map_err(|e| (PHASE_SENDING_CHUNKED, e))?,
        }
    } else if result.is_some() {
        return Err((
            PHASE_REQUEST_HANDLER,
            Error::Usage("handlers that call accept_response() should return None"),
        ));
    }

    if exchange.app_state() == AppState::HeadersSent {
        exchange.finish().await.map_err(|e| (PHASE_FINALIZING, e))?;
    }
    Ok(())
}

/// Normalize and fill in a content type; the body is materialized but a
/// stream is not polled.
fn prepare(response: crate::response::Response) -> Result<(StatusCode, HeaderMap, Payload)> {
    let mut normalized = normalize(response)?;
    if !normalized.headers.contains_key(CONTENT_TYPE) {
        let guessed = guess_content_type(&normalized.body);
        normalized
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(guessed));
    }
    let payload = materialize(normalized.body)?;
    Ok((normalized.status, normalized.headers, payload))
}

async fn send_full(exchange: &HttpExchange, status: StatusCode, mut headers: HeaderMap, body: Bytes) -> Result<()> {
    if !headers.contains_key(CONTENT_LENGTH) {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    }
    exchange.accept_response(status.as_u16(), headers).await?;
    exchange.send_chunk(body, true).await
}

/// Headers go out with the first chunk, so a stream that fails before
/// producing anything still gets a clean error response.
async fn send_stream(
    exchange: &HttpExchange,
    status: StatusCode,
    headers: HeaderMap,
    mut stream: ChunkStream,
) -> Result<()> {
    let mut pending_headers = Some(headers);
    loop {
        let next = AssertUnwindSafe(stream.next())
            .catch_unwind()
            .await
            .map_err(panic_error)?;
        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(Error::from_boxed)?;
        if let Some(headers) = pending_headers.take() {
            exchange.accept_response(status.as_u16(), headers).await?;
        }
        exchange.send(chunk).await?;
    }
    if let Some(headers) = pending_headers.take() {
        exchange.accept_response(status.as_u16(), headers).await?;
    }
    Ok(())
}

async fn fail(dispatcher: &Dispatcher, exchange: &HttpExchange, phase: &'static str, err: Error) {
    if err.is_disconnect() {
        tracing::debug!(exchange_id = %exchange.id(), phase, "Client went away");
        return;
    }
    let message = dispatcher.report_failure(exchange.id(), phase, &err);

    let cleanup = match exchange.app_state() {
        AppState::BeforeHeaders => send_error_response(exchange, err.status_code(), message).await,
        AppState::HeadersSent => exchange.finish().await,
        AppState::Finished => Ok(()),
    };
    if let Err(e) = cleanup {
        tracing::debug!(exchange_id = %exchange.id(), error = %e, "Could not deliver error response");
    }
}

async fn send_error_response(exchange: &HttpExchange, status: StatusCode, message: String) -> Result<()> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(message.len()));
    exchange.accept_response(status.as_u16(), headers).await?;
    exchange.send_chunk(message, true).await
}
