//! HTTP exchange state machine.
//!
//! # Responsibilities
//! - Stream the request body in (`receive_chunk`, `body_stream`, `body`)
//! - Stream the response out (`accept_response`, `send_chunk`)
//! - Long-poll primitive: `sleep_until` + `wake`
//!
//! # States
//! ```text
//! client:      AwaitingBody ──▶ BodyDone ──▶ Terminated
//!                   └───────────────────────────▲   (disconnect)
//! application: BeforeHeaders ──▶ HeadersSent ──▶ Finished
//! ```

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use ::http::{HeaderMap, StatusCode};
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use tokio::sync::Notify;

use super::{lock, ExchangeCore, ExchangeId};
use crate::error::{Error, Result};
use crate::protocol::message::RawHeaders;
use crate::protocol::{Message, Scope};
use crate::response::Chunk;
use crate::transport::{Transport, TransportError};

/// Default limit for [`HttpExchange::body`]: 10 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Client-side (request) stream state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    AwaitingBody,
    BodyDone,
    Terminated,
}

/// Application-side (response) stream state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    BeforeHeaders,
    HeadersSent,
    Finished,
}

struct HttpState {
    client: ClientState,
    app: AppState,
    /// Body iteration started, or body data was drained while sleeping.
    body_touched: bool,
    body: Option<Bytes>,
}

pub(crate) struct HttpInner {
    core: ExchangeCore,
    state: Mutex<HttpState>,
    wake: Notify,
    body_limit: usize,
}

/// One HTTP request/response exchange.
#[derive(Clone)]
pub struct HttpExchange {
    inner: Arc<HttpInner>,
}

impl HttpExchange {
    pub fn new(scope: Scope, transport: Arc<dyn Transport>) -> Self {
        Self::with_body_limit(scope, transport, DEFAULT_BODY_LIMIT)
    }

    pub fn with_body_limit(scope: Scope, transport: Arc<dyn Transport>, body_limit: usize) -> Self {
        Self {
            inner: Arc::new(HttpInner {
                core: ExchangeCore::new(scope, transport),
                state: Mutex::new(HttpState {
                    client: ClientState::AwaitingBody,
                    app: AppState::BeforeHeaders,
                    body_touched: false,
                    body: None,
                }),
                wake: Notify::new(),
                body_limit,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<HttpInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<HttpInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn core(&self) -> &ExchangeCore {
        &self.inner.core
    }

    pub fn id(&self) -> ExchangeId {
        self.inner.core.id
    }

    pub fn info(&self) -> &super::ConnectionInfo {
        &self.inner.core.info
    }

    pub fn client_state(&self) -> ClientState {
        lock(&self.inner.state).client
    }

    pub fn app_state(&self) -> AppState {
        lock(&self.inner.state).app
    }

    /// Commit to a status and headers. Only valid once, before any body.
    pub async fn accept_response(&self, status: u16, headers: HeaderMap) -> Result<()> {
        let status = StatusCode::from_u16(status)
            .map_err(|_| Error::Shape(format!("status code must be an int in 100..=999, got {status}")))?;
        {
            let mut state = lock(&self.inner.state);
            if state.app != AppState::BeforeHeaders {
                return Err(Error::Protocol("already accepted"));
            }
            if state.client == ClientState::Terminated {
                return Err(Error::ConnectionClosed("cannot send: client already disconnected"));
            }
            state.app = AppState::HeadersSent;
        }
        tracing::debug!(exchange_id = %self.id(), status = status.as_u16(), "Response accepted");
        self.inner
            .core
            .transport
            .send(Message::HttpResponseStart {
                status: status.as_u16(),
                headers: wire_headers(&headers),
            })
            .await?;
        Ok(())
    }

    /// Send one body chunk; `is_final` ends the response.
    pub async fn send_chunk(&self, data: impl Into<Chunk>, is_final: bool) -> Result<()> {
        {
            let mut state = lock(&self.inner.state);
            match state.app {
                AppState::BeforeHeaders => {
                    return Err(Error::Protocol("cannot send before accepting the response"))
                }
                AppState::Finished => return Err(Error::Protocol("cannot send after the response finished")),
                AppState::HeadersSent => {}
            }
            if state.client == ClientState::Terminated {
                return Err(Error::ConnectionClosed("cannot send: client already disconnected"));
            }
            if is_final {
                state.app = AppState::Finished;
            }
        }
        self.inner
            .core
            .transport
            .send(Message::HttpResponseBody {
                body: data.into().into_bytes(),
                more_body: !is_final,
            })
            .await?;
        Ok(())
    }

    /// Send a chunk and keep the response open.
    pub async fn send(&self, data: impl Into<Chunk>) -> Result<()> {
        self.send_chunk(data, false).await
    }

    /// End the response with an empty final chunk.
    pub async fn finish(&self) -> Result<()> {
        self.send_chunk(Bytes::new(), true).await
    }

    /// Pull the next request body chunk. `None` once the body is complete.
    pub async fn receive_chunk(&self) -> Result<Option<Bytes>> {
        match self.client_state() {
            ClientState::Terminated => return Err(Error::Disconnected),
            ClientState::BodyDone => return Ok(None),
            ClientState::AwaitingBody => {}
        }
        match self.inner.core.transport.receive().await {
            Ok(Message::HttpRequest { body, more_body }) => {
                if !more_body {
                    lock(&self.inner.state).client = ClientState::BodyDone;
                }
                Ok(Some(body))
            }
            Ok(Message::HttpDisconnect) | Err(TransportError::Closed) => Err(self.mark_disconnected()),
            Ok(other) => {
                tracing::warn!(exchange_id = %self.id(), msg_type = other.kind(), "Unexpected message for HTTP exchange");
                Err(Error::Protocol("unexpected message for HTTP exchange"))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Iterate over the request body chunks. Can only be started once.
    pub fn body_stream(&self) -> Result<BoxStream<'static, Result<Bytes>>> {
        {
            let mut state = lock(&self.inner.state);
            if state.body_touched {
                return Err(Error::Protocol("request body was already consumed"));
            }
            if state.client == ClientState::Terminated {
                return Err(Error::ConnectionClosed("cannot read body: client already disconnected"));
            }
            state.body_touched = true;
        }
        let stream = stream::unfold(Some(self.clone()), |exchange| async move {
            let exchange = exchange?;
            match exchange.receive_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(exchange))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        });
        Ok(stream.boxed())
    }

    /// Read the whole body, failing once it grows past `limit` bytes.
    /// The result is cached; later calls return it without reading.
    pub async fn consume_full_body(&self, limit: usize) -> Result<Bytes> {
        if let Some(body) = lock(&self.inner.state).body.clone() {
            return Ok(body);
        }
        let mut chunks = self.body_stream()?;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            if buffer.len() + chunk.len() > limit {
                return Err(Error::PayloadTooLarge { limit });
            }
            buffer.extend_from_slice(&chunk);
        }
        let body = buffer.freeze();
        lock(&self.inner.state).body = Some(body.clone());
        Ok(body)
    }

    /// Whole body with the configured default limit.
    pub async fn body(&self) -> Result<Bytes> {
        self.consume_full_body(self.inner.body_limit).await
    }

    /// Whole body decoded as JSON.
    pub async fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let body = self.body().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Suspend until `timeout` elapses, [`wake`](Self::wake) is called, or
    /// the client disconnects (an error). Request body data that arrives
    /// meanwhile is discarded.
    pub async fn sleep_until(&self, timeout: Duration) -> Result<()> {
        if self.client_state() == ClientState::Terminated {
            return Err(Error::Disconnected);
        }
        let woken = self.inner.wake.notified();
        tokio::select! {
            _ = tokio::time::sleep(timeout) => Ok(()),
            _ = woken => Ok(()),
            err = self.wait_for_disconnect() => Err(err),
        }
    }

    /// Resume a task blocked in [`sleep_until`](Self::sleep_until). Has no
    /// effect when nobody is sleeping.
    pub fn wake(&self) {
        self.inner.wake.notify_waiters();
    }

    async fn wait_for_disconnect(&self) -> Error {
        loop {
            match self.inner.core.transport.receive().await {
                Ok(Message::HttpRequest { more_body, .. }) => {
                    let mut state = lock(&self.inner.state);
                    state.body_touched = true;
                    if !more_body {
                        state.client = ClientState::BodyDone;
                    }
                }
                Ok(Message::HttpDisconnect) | Err(TransportError::Closed) => return self.mark_disconnected(),
                Ok(other) => {
                    tracing::debug!(exchange_id = %self.id(), msg_type = other.kind(), "Discarding message while sleeping");
                }
                Err(e) => return e.into(),
            }
        }
    }

    fn mark_disconnected(&self) -> Error {
        lock(&self.inner.state).client = ClientState::Terminated;
        tracing::debug!(exchange_id = %self.id(), "HTTP client disconnected");
        Error::Disconnected
    }
}

impl std::fmt::Debug for HttpExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("HttpExchange")
            .field("id", &self.inner.core.id)
            .field("client", &state.client)
            .field("app", &state.app)
            .finish()
    }
}

/// Header map to the wire's list of lower-case byte pairs.
pub(crate) fn wire_headers(headers: &HeaderMap) -> RawHeaders {
    headers
        .iter()
        .map(|(name, value)| {
            (
                Bytes::copy_from_slice(name.as_str().as_bytes()),
                Bytes::copy_from_slice(value.as_bytes()),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{channel, Peer};

    fn exchange() -> (HttpExchange, Peer) {
        let (transport, peer) = channel();
        (HttpExchange::new(Scope::http("POST", "/"), Arc::new(transport)), peer)
    }

    fn request(body: &'static [u8], more_body: bool) -> Message {
        Message::HttpRequest {
            body: Bytes::from_static(body),
            more_body,
        }
    }

    #[tokio::test]
    async fn accept_then_final_chunk_finishes() {
        let (ex, mut peer) = exchange();
        ex.accept_response(200, HeaderMap::new()).await.unwrap();
        assert_eq!(ex.app_state(), AppState::HeadersSent);
        ex.send_chunk("hi", true).await.unwrap();
        assert_eq!(ex.app_state(), AppState::Finished);

        assert_eq!(
            peer.recv().await,
            Some(Message::HttpResponseStart {
                status: 200,
                headers: vec![]
            })
        );
        assert_eq!(
            peer.recv().await,
            Some(Message::HttpResponseBody {
                body: Bytes::from_static(b"hi"),
                more_body: false
            })
        );
    }

    #[tokio::test]
    async fn send_before_accept_is_a_protocol_error() {
        let (ex, _peer) = exchange();
        let err = ex.send_chunk("x", false).await.unwrap_err();
        assert_eq!(err.kind(), "ProtocolError");
        let err = ex.send_chunk("x", true).await.unwrap_err();
        assert_eq!(err.kind(), "ProtocolError");
        assert_eq!(ex.app_state(), AppState::BeforeHeaders);
    }

    #[tokio::test]
    async fn accept_twice_and_send_after_finish() {
        let (ex, _peer) = exchange();
        ex.accept_response(200, HeaderMap::new()).await.unwrap();
        let err = ex.accept_response(200, HeaderMap::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "already accepted");
        ex.finish().await.unwrap();
        let err = ex.send("late").await.unwrap_err();
        assert_eq!(err.kind(), "ProtocolError");
    }

    #[tokio::test]
    async fn full_body_within_limit_is_memoized() {
        let (ex, peer) = exchange();
        peer.send(request(b"foo", true)).unwrap();
        peer.send(request(b"bar", false)).unwrap();
        let body = ex.consume_full_body(6).await.unwrap();
        assert_eq!(body, Bytes::from_static(b"foobar"));
        assert_eq!(ex.client_state(), ClientState::BodyDone);
        assert_eq!(ex.consume_full_body(6).await.unwrap(), body);
        assert_eq!(ex.consume_full_body(1).await.unwrap(), body);
    }

    #[tokio::test]
    async fn full_body_over_limit() {
        let (ex, peer) = exchange();
        peer.send(request(b"xxxxxx", true)).unwrap();
        peer.send(request(b"xxxxx", false)).unwrap();
        let err = ex.consume_full_body(10).await.unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { limit: 10 }));
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn body_stream_only_once() {
        let (ex, peer) = exchange();
        peer.send(request(b"x", false)).unwrap();
        let chunks: Vec<_> = ex.body_stream().unwrap().collect().await;
        assert_eq!(chunks.len(), 1);
        let err = ex.body_stream().err().unwrap();
        assert!(err.to_string().contains("already consumed"));
    }

    #[tokio::test]
    async fn disconnect_while_reading() {
        let (ex, peer) = exchange();
        peer.send(request(b"x", true)).unwrap();
        peer.send(Message::HttpDisconnect).unwrap();
        assert_eq!(ex.receive_chunk().await.unwrap(), Some(Bytes::from_static(b"x")));
        assert!(ex.receive_chunk().await.unwrap_err().is_disconnect());
        assert_eq!(ex.client_state(), ClientState::Terminated);
        assert!(ex.receive_chunk().await.unwrap_err().is_disconnect());

        let err = ex.send_chunk("x", false).await.unwrap_err();
        assert_eq!(err.kind(), "ProtocolError");
        let err = ex.accept_response(200, HeaderMap::new()).await.unwrap_err();
        assert_eq!(err.kind(), "ConnectionClosedError");
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_times_out() {
        let (ex, _peer) = exchange();
        let start = tokio::time::Instant::now();
        ex.sleep_until(Duration::from_secs(3)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_drains_body_and_blocks_later_reads() {
        let (ex, peer) = exchange();
        peer.send(request(b"xx", false)).unwrap();
        ex.sleep_until(Duration::from_millis(100)).await.unwrap();
        assert_eq!(ex.client_state(), ClientState::BodyDone);
        let err = ex.body_stream().err().unwrap();
        assert!(err.to_string().contains("already consumed"));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_ends_on_disconnect() {
        let (ex, peer) = exchange();
        peer.send(Message::HttpDisconnect).unwrap();
        let err = ex.sleep_until(Duration::from_secs(60)).await.unwrap_err();
        assert!(err.is_disconnect());
        let err = ex.sleep_until(Duration::from_secs(60)).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test(start_paused = true)]
    async fn wake_resumes_sleeper_but_does_not_queue() {
        let (ex, _peer) = exchange();
        // nobody sleeping: no effect
        ex.wake();
        let start = tokio::time::Instant::now();

        let sleeper = ex.clone();
        let task = tokio::spawn(async move { sleeper.sleep_until(Duration::from_secs(10)).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        ex.wake();
        task.await.unwrap().unwrap();
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn wire_headers_are_lowercase() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "text/plain".parse().unwrap());
        let wire = wire_headers(&headers);
        assert_eq!(wire, vec![(Bytes::from_static(b"content-type"), Bytes::from_static(b"text/plain"))]);
    }
}
