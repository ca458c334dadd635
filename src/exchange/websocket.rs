//! WebSocket exchange state machine.
//!
//! # Responsibilities
//! - Handshake (`accept`), message I/O (`send`, `receive`) and `close`
//! - Track the client side (`Connecting → Open → Closed`) and the
//!   application side separately so each direction fails precisely
//!
//! # Design Decisions
//! - JSON values go out as bytes frames and must be an object or array
//! - A received disconnect records its close code for [`WebsocketExchange::close_code`]

use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{lock, ConnectionInfo, ExchangeCore, ExchangeId};
use crate::error::{Error, Result};
use crate::protocol::message::NORMAL_CLOSURE;
use crate::protocol::{Message, Scope};
use crate::transport::{Transport, TransportError};

/// State of one side of a websocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Connecting,
    Open,
    Closed,
}

/// A message received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Bytes(Bytes),
    Text(String),
}

impl WsMessage {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            WsMessage::Bytes(b) => b,
            WsMessage::Text(t) => t.as_bytes(),
        }
    }
}

/// A value the application can send.
#[derive(Debug, Clone, PartialEq)]
pub enum WsValue {
    Bytes(Bytes),
    Text(String),
    /// Encoded and sent as a bytes frame.
    Json(serde_json::Value),
}

struct WsState {
    client: SocketState,
    app: SocketState,
    close_code: Option<u16>,
}

pub(crate) struct WsInner {
    core: ExchangeCore,
    state: Mutex<WsState>,
}

/// One websocket connection.
#[derive(Clone)]
pub struct WebsocketExchange {
    inner: Arc<WsInner>,
}

impl WebsocketExchange {
    pub fn new(scope: Scope, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(WsInner {
                core: ExchangeCore::new(scope, transport),
                state: Mutex::new(WsState {
                    client: SocketState::Connecting,
                    app: SocketState::Connecting,
                    close_code: None,
                }),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<WsInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<WsInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn core(&self) -> &ExchangeCore {
        &self.inner.core
    }

    pub fn id(&self) -> ExchangeId {
        self.inner.core.id
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.inner.core.info
    }

    pub fn client_state(&self) -> SocketState {
        lock(&self.inner.state).client
    }

    pub fn app_state(&self) -> SocketState {
        lock(&self.inner.state).app
    }

    /// Close code sent by the client, once it disconnected.
    pub fn close_code(&self) -> Option<u16> {
        lock(&self.inner.state).close_code
    }

    /// Complete the handshake, optionally picking a subprotocol.
    pub async fn accept(&self, subprotocol: Option<&str>) -> Result<()> {
        if self.client_state() == SocketState::Connecting {
            self.receive_message().await?;
        }
        {
            let mut state = lock(&self.inner.state);
            if state.app != SocketState::Connecting {
                return Err(Error::Protocol("websocket already accepted"));
            }
            if state.client == SocketState::Closed {
                return Err(Error::ConnectionClosed("cannot accept: client already disconnected"));
            }
            state.app = SocketState::Open;
        }
        tracing::debug!(exchange_id = %self.id(), subprotocol = ?subprotocol, "Websocket accepted");
        self.inner
            .core
            .transport
            .send(Message::WebsocketAccept {
                subprotocol: subprotocol.map(str::to_owned),
            })
            .await?;
        Ok(())
    }

    /// Send bytes, text, or a JSON object or array.
    pub async fn send(&self, value: impl Into<WsValue>) -> Result<()> {
        let message = match value.into() {
            WsValue::Bytes(bytes) => Message::WebsocketSend {
                bytes: Some(bytes),
                text: None,
            },
            WsValue::Text(text) => Message::WebsocketSend {
                bytes: None,
                text: Some(text),
            },
            WsValue::Json(value) => {
                if !(value.is_object() || value.is_array()) {
                    return Err(Error::Type("can only send bytes, text, or a JSON object or array"));
                }
                let encoded = serde_json::to_vec(&value).map_err(|e| Error::Encode(e.to_string()))?;
                Message::WebsocketSend {
                    bytes: Some(Bytes::from(encoded)),
                    text: None,
                }
            }
        };
        {
            let state = lock(&self.inner.state);
            if state.app != SocketState::Open {
                return Err(Error::Protocol("cannot send: websocket is not open"));
            }
            if state.client == SocketState::Closed {
                return Err(Error::ConnectionClosed("cannot send: client already disconnected"));
            }
        }
        self.inner.core.transport.send(message).await?;
        Ok(())
    }

    /// Serialize `value` and send it as JSON.
    pub async fn send_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| Error::Encode(e.to_string()))?;
        self.send(WsValue::Json(value)).await
    }

    /// Wait for the next message from the client.
    pub async fn receive(&self) -> Result<WsMessage> {
        if self.app_state() != SocketState::Open {
            return Err(Error::Protocol("cannot receive: websocket is not open"));
        }
        loop {
            if let Some(message) = self.receive_message().await? {
                return Ok(message);
            }
        }
    }

    /// Receive and decode one JSON message.
    pub async fn receive_json<T: DeserializeOwned>(&self) -> Result<T> {
        let message = self.receive().await?;
        Ok(serde_json::from_slice(message.as_bytes())?)
    }

    /// Stream of incoming messages. Ends quietly when the client
    /// disconnects; any other failure is yielded once, then the stream ends.
    pub fn receive_iter(&self) -> BoxStream<'static, Result<WsMessage>> {
        stream::unfold(Some(self.clone()), |exchange| async move {
            let exchange = exchange?;
            match exchange.receive().await {
                Ok(message) => Some((Ok(message), Some(exchange))),
                Err(e) if e.is_disconnect() => None,
                Err(e) => Some((Err(e), None)),
            }
        })
        .boxed()
    }

    /// Close from the application side.
    pub async fn close(&self, code: u16) -> Result<()> {
        {
            let mut state = lock(&self.inner.state);
            if state.app == SocketState::Closed {
                return Err(Error::Protocol("websocket already closed"));
            }
            state.app = SocketState::Closed;
        }
        tracing::debug!(exchange_id = %self.id(), code, "Websocket closed by application");
        self.inner.core.transport.send(Message::WebsocketClose { code }).await?;
        Ok(())
    }

    /// Close with the normal closure code.
    pub async fn close_normal(&self) -> Result<()> {
        self.close(NORMAL_CLOSURE).await
    }

    /// Pull one message off the transport and advance the client state.
    /// `Ok(None)` means the handshake message was consumed.
    async fn receive_message(&self) -> Result<Option<WsMessage>> {
        if self.client_state() == SocketState::Closed {
            return Err(Error::Disconnected);
        }
        let message = match self.inner.core.transport.receive().await {
            Ok(message) => message,
            Err(TransportError::Closed) => return Err(self.mark_disconnected(NORMAL_CLOSURE)),
            Err(e) => return Err(e.into()),
        };
        let mut state = lock(&self.inner.state);
        match (state.client, message) {
            (SocketState::Connecting, Message::WebsocketConnect) => {
                state.client = SocketState::Open;
                Ok(None)
            }
            (_, Message::WebsocketDisconnect { code }) => {
                drop(state);
                Err(self.mark_disconnected(code))
            }
            (SocketState::Open, Message::WebsocketReceive { bytes: Some(bytes), .. }) => {
                Ok(Some(WsMessage::Bytes(bytes)))
            }
            (SocketState::Open, Message::WebsocketReceive { text: Some(text), .. }) => {
                Ok(Some(WsMessage::Text(text)))
            }
            (client, other) => {
                tracing::warn!(
                    exchange_id = %self.id(),
                    client = ?client,
                    msg_type = other.kind(),
                    "Unexpected message for websocket exchange"
                );
                Err(Error::Protocol("unexpected message for websocket exchange"))
            }
        }
    }

    fn mark_disconnected(&self, code: u16) -> Error {
        {
            let mut state = lock(&self.inner.state);
            state.client = SocketState::Closed;
            state.close_code = Some(code);
        }
        tracing::debug!(exchange_id = %self.id(), code, "Websocket client disconnected");
        Error::Disconnected
    }
}

impl std::fmt::Debug for WebsocketExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("WebsocketExchange")
            .field("id", &self.inner.core.id)
            .field("client", &state.client)
            .field("app", &state.app)
            .finish()
    }
}

impl From<WsMessage> for WsValue {
    fn from(message: WsMessage) -> Self {
        match message {
            WsMessage::Bytes(b) => WsValue::Bytes(b),
            WsMessage::Text(t) => WsValue::Text(t),
        }
    }
}

impl From<&str> for WsValue {
    fn from(s: &str) -> Self {
        WsValue::Text(s.to_owned())
    }
}

impl From<String> for WsValue {
    fn from(s: String) -> Self {
        WsValue::Text(s)
    }
}

impl From<Bytes> for WsValue {
    fn from(b: Bytes) -> Self {
        WsValue::Bytes(b)
    }
}

impl From<Vec<u8>> for WsValue {
    fn from(b: Vec<u8>) -> Self {
        WsValue::Bytes(Bytes::from(b))
    }
}

impl From<serde_json::Value> for WsValue {
    fn from(v: serde_json::Value) -> Self {
        WsValue::Json(v)
    }
}
