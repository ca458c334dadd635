//! Bridge between an axum websocket upgrade and a websocket exchange.
//!
//! The application decides on the handshake: `websocket.accept` completes
//! the upgrade, anything else answers `403 Forbidden`.

use axum::extract::ws::{CloseFrame, Message as Frame, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use super::HostState;
use crate::protocol::{Message, ScopeKind};

/// Close code reported when the peer closed without giving one.
const NO_STATUS: u16 = 1005;
/// Close code reported when the connection dropped without a close frame.
const ABNORMAL: u16 = 1006;

pub(super) async fn bridge(state: &HostState, upgrade: WebSocketUpgrade, parts: &Parts) -> Response {
    let scope = state.scope(ScopeKind::Websocket, parts);
    let (peer, _task) = state.spawn(scope);
    let (inbound, mut outbound) = peer.into_parts();

    if inbound.send(Message::WebsocketConnect).is_err() {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    match outbound.recv().await {
        Some(Message::WebsocketAccept { subprotocol }) => {
            let upgrade = match subprotocol {
                Some(protocol) => upgrade.protocols([protocol]),
                None => upgrade,
            };
            upgrade.on_upgrade(move |socket| pump(socket, inbound, outbound))
        }
        other => {
            tracing::debug!(msg_type = ?other.as_ref().map(Message::kind), "Websocket handshake rejected");
            let _ = inbound.send(Message::WebsocketDisconnect { code: ABNORMAL });
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// Move frames both ways until either side closes.
async fn pump(socket: WebSocket, inbound: UnboundedSender<Message>, mut outbound: UnboundedReceiver<Message>) {
    let (mut sink, mut stream) = socket.split();
    let disconnect_code = loop {
        tokio::select! {
            incoming = stream.next() => {
                let message = match incoming {
                    Some(Ok(Frame::Text(text))) => Message::WebsocketReceive {
                        bytes: None,
                        text: Some(text.as_str().to_owned()),
                    },
                    Some(Ok(Frame::Binary(data))) => Message::WebsocketReceive {
                        bytes: Some(data),
                        text: None,
                    },
                    Some(Ok(Frame::Close(frame))) => break frame.map_or(NO_STATUS, |f| f.code),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "Websocket read failed");
                        break ABNORMAL;
                    }
                    None => break ABNORMAL,
                };
                if inbound.send(message).is_err() {
                    let _ = sink.send(Frame::Close(None)).await;
                    return;
                }
            }
            outgoing = outbound.recv() => {
                let frame = match outgoing {
                    Some(Message::WebsocketSend { bytes: Some(data), .. }) => Frame::Binary(data),
                    Some(Message::WebsocketSend { text: Some(text), .. }) => Frame::Text(Utf8Bytes::from(text)),
                    Some(Message::WebsocketClose { code }) => {
                        let close = CloseFrame { code, reason: Utf8Bytes::from_static("") };
                        let _ = sink.send(Frame::Close(Some(close))).await;
                        break code;
                    }
                    Some(other) => {
                        tracing::warn!(msg_type = other.kind(), "Ignoring unexpected websocket message");
                        continue;
                    }
                    None => {
                        let _ = sink.send(Frame::Close(None)).await;
                        return;
                    }
                };
                if let Err(e) = sink.send(frame).await {
                    tracing::debug!(error = %e, "Websocket write failed");
                    break ABNORMAL;
                }
            }
        }
    };
    let _ = inbound.send(Message::WebsocketDisconnect { code: disconnect_code });
}
