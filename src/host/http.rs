//! Bridge between one axum HTTP request and an HTTP exchange.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use super::HostState;
use crate::protocol::{Message, ScopeKind};

/// Sends `http.disconnect` when the connection side of the bridge goes
/// away: after the response body is done, or when the client vanished.
struct DisconnectGuard(UnboundedSender<Message>);

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let _ = self.0.send(Message::HttpDisconnect);
    }
}

pub(super) async fn bridge(state: &HostState, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let scope = state.scope(ScopeKind::Http, &parts);
    let (peer, _task) = state.spawn(scope);
    let (inbound, mut outbound) = peer.into_parts();
    let guard = DisconnectGuard(inbound.clone());

    tokio::spawn(feed_request_body(body, inbound));

    match outbound.recv().await {
        Some(Message::HttpResponseStart { status, headers }) => {
            let mut response = Response::new(Body::from_stream(response_body(outbound, guard)));
            *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            for (name, value) in headers {
                match (HeaderName::from_bytes(&name), HeaderValue::from_bytes(&value)) {
                    (Ok(name), Ok(value)) => {
                        response.headers_mut().append(name, value);
                    }
                    _ => tracing::warn!(header = ?name, "Dropping invalid response header"),
                }
            }
            response
        }
        other => {
            tracing::error!(
                msg_type = ?other.as_ref().map(Message::kind),
                "Application did not start a response"
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn feed_request_body(body: Body, inbound: UnboundedSender<Message>) {
    let mut chunks = body.into_data_stream();
    loop {
        let message = match chunks.next().await {
            Some(Ok(chunk)) => Message::HttpRequest {
                body: chunk,
                more_body: true,
            },
            Some(Err(e)) => {
                tracing::debug!(error = %e, "Request body stream failed");
                let _ = inbound.send(Message::HttpDisconnect);
                return;
            }
            None => Message::HttpRequest {
                body: Bytes::new(),
                more_body: false,
            },
        };
        let last = matches!(message, Message::HttpRequest { more_body: false, .. });
        if inbound.send(message).is_err() || last {
            return;
        }
    }
}

/// Response body chunks until the application sends the final one.
fn response_body(
    outbound: UnboundedReceiver<Message>,
    guard: DisconnectGuard,
) -> impl futures_util::Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    stream::unfold(Some((outbound, guard)), |state| async move {
        let (mut outbound, guard) = state?;
        loop {
            match outbound.recv().await? {
                Message::HttpResponseBody { body, more_body } => {
                    let next = more_body.then_some((outbound, guard));
                    return Some((Ok(body), next));
                }
                other => tracing::warn!(msg_type = other.kind(), "Ignoring message after response start"),
            }
        }
    })
}
