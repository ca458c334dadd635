//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::task::JoinHandle;

use gateway_adapter::observability::{Event, Reporter};
use gateway_adapter::protocol::{Message, Scope};
use gateway_adapter::transport::{channel, Peer};
use gateway_adapter::Dispatcher;

/// Reporter that keeps every event for later assertions.
#[derive(Clone, Default)]
pub struct CaptureReporter {
    events: Arc<Mutex<Vec<Event>>>,
}

impl CaptureReporter {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Messages of all `ExchangeFailed` events.
    pub fn failures(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::ExchangeFailed { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for CaptureReporter {
    fn report(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// A connection being driven by a dispatcher on its own task.
pub struct Connection {
    pub peer: Peer,
    pub task: JoinHandle<()>,
}

impl Connection {
    pub fn send(&self, message: Message) {
        self.peer.send(message).unwrap();
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.peer.recv().await
    }

    /// Wait for the dispatcher to finish with this connection.
    pub async fn finish(self) {
        self.task.await.unwrap();
    }
}

pub fn connect(dispatcher: &Dispatcher, scope: Scope) -> Connection {
    let (transport, peer) = channel();
    let dispatcher = dispatcher.clone();
    let task = tokio::spawn(async move { dispatcher.dispatch(scope, Arc::new(transport)).await });
    Connection { peer, task }
}

pub fn body_chunk(body: &'static [u8], more_body: bool) -> Message {
    Message::HttpRequest {
        body: Bytes::from_static(body),
        more_body,
    }
}

/// A complete response as seen by the hosting server.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Body chunks in order, including empty ones.
    pub chunks: Vec<Bytes>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Read `http.response.start` plus body messages until the final one.
pub async fn read_response(connection: &mut Connection) -> HttpResponse {
    let (status, raw_headers) = match connection.recv().await {
        Some(Message::HttpResponseStart { status, headers }) => (status, headers),
        other => panic!("expected http.response.start, got {other:?}"),
    };
    let headers = raw_headers
        .into_iter()
        .map(|(k, v)| {
            (
                String::from_utf8(k.to_vec()).unwrap(),
                String::from_utf8(v.to_vec()).unwrap(),
            )
        })
        .collect();
    let mut body = Vec::new();
    let mut chunks = Vec::new();
    loop {
        match connection.recv().await {
            Some(Message::HttpResponseBody { body: chunk, more_body }) => {
                body.extend_from_slice(&chunk);
                chunks.push(chunk);
                if !more_body {
                    break;
                }
            }
            other => panic!("expected http.response.body, got {other:?}"),
        }
    }
    HttpResponse {
        status,
        headers,
        body,
        chunks,
    }
}

/// Send a complete (empty) request body, then read the response.
pub async fn get(dispatcher: &Dispatcher, scope: Scope) -> HttpResponse {
    let mut connection = connect(dispatcher, scope);
    connection.send(body_chunk(b"", false));
    let response = read_response(&mut connection).await;
    connection.finish().await;
    response
}
