//! Demo chat served through the adapter: short poll, long poll, SSE and
//! websockets, all fed from one message history.
//!
//! Long-poll and SSE requests sleep in a [`WaitableRegistry`] and are woken
//! when a message is posted; websocket members get the history pushed.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use http::{HeaderMap, HeaderValue};

use gateway_adapter::exchange::WsMessage;
use gateway_adapter::{reply, HandlerResult, HttpExchange, Request, WaitableRegistry, WebsocketExchange};

const HISTORY: usize = 32;
const MAX_MESSAGE_BYTES: usize = 1024;
const LONG_POLL_TIMEOUT: Duration = Duration::from_secs(3);
const SSE_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Clone, Default)]
pub struct Chat {
    messages: Arc<Mutex<VecDeque<String>>>,
    waiting: WaitableRegistry,
}

impl Chat {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn handle(&self, request: Request) -> HandlerResult {
        match request {
            Request::Http(http) => self.http(http).await,
            Request::Websocket(ws) => self.websocket(ws).await,
        }
    }

    async fn http(&self, http: HttpExchange) -> HandlerResult {
        let path = http.info().path();
        match path.as_str() {
            "/" => reply(page("none")),
            "/short_poll" => reply(page("short_poll")),
            "/long_poll" => reply(page("long_poll")),
            "/sse" => reply(page("sse")),
            "/ws" => reply(page("ws")),
            "/say" => {
                let body = http.consume_full_body(MAX_MESSAGE_BYTES).await?;
                self.post(String::from_utf8_lossy(&body).into_owned()).await;
                reply((200, HeaderMap::new(), Bytes::new()))
            }
            "/messages/short_poll" => reply(self.joined()),
            "/messages/long_poll" => {
                self.waiting.add(&http);
                http.accept_response(200, text_headers("text/plain")).await?;
                http.sleep_until(LONG_POLL_TIMEOUT).await?;
                http.send(self.joined()).await?;
                Ok(None)
            }
            "/messages/sse" => {
                self.waiting.add(&http);
                let mut headers = text_headers("text/event-stream");
                headers.insert("cache-control", HeaderValue::from_static("no-cache"));
                http.accept_response(200, headers).await?;
                loop {
                    http.sleep_until(SSE_INTERVAL).await?;
                    http.send(format!("event: message\ndata: {}\n\n", self.joined()))
                        .await?;
                }
            }
            _ => reply((404, "not found")),
        }
    }

    async fn websocket(&self, ws: WebsocketExchange) -> HandlerResult {
        ws.accept(None).await?;
        self.waiting.add(&ws);
        ws.send(self.joined()).await?;

        let mut incoming = ws.receive_iter();
        while let Some(message) = incoming.next().await {
            let text = match message? {
                WsMessage::Text(text) => text,
                WsMessage::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            };
            self.post(text).await;
        }
        Ok(None)
    }

    async fn post(&self, message: String) {
        {
            let mut messages = self.messages.lock().unwrap_or_else(|p| p.into_inner());
            messages.push_back(message);
            while messages.len() > HISTORY {
                messages.pop_front();
            }
        }
        let text = self.joined();
        for member in &self.waiting {
            match member {
                Request::Http(http) => http.wake(),
                Request::Websocket(ws) => {
                    if let Err(e) = ws.send(text.clone()).await {
                        tracing::debug!(exchange_id = %ws.id(), error = %e, "Skipping chat member");
                    }
                }
            }
        }
    }

    fn joined(&self) -> String {
        let messages = self.messages.lock().unwrap_or_else(|p| p.into_inner());
        messages.iter().cloned().collect::<Vec<_>>().join("<br>")
    }
}

fn text_headers(content_type: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static(content_type));
    headers
}

fn page(poll_method: &str) -> String {
    PAGE_TEMPLATE.replace("POLL_METHOD", poll_method)
}

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Gateway chat: POLL_METHOD</title>
</head>
<body>
<div>
  Polling method: POLL_METHOD |
  <a href="/">none</a> <a href="/short_poll">short poll</a>
  <a href="/long_poll">long poll</a> <a href="/sse">SSE</a> <a href="/ws">websocket</a>
</div>
<div id="messages"></div>
<input type="text" id="text" placeholder="Your message ..." />
<input type="button" id="button" value="Send" />
<script>
var method = 'POLL_METHOD';
var socket = null;
function setText(text) { document.getElementById("messages").innerHTML = text; }
async function shortPoll() {
  let r = await fetch("/messages/short_poll");
  if (r.status == 200) { setText(await r.text()); }
}
async function longPoll() {
  let r = await fetch("/messages/long_poll");
  if (r.status == 200) { setText(await r.text()); longPoll(); }
}
window.onload = function () {
  shortPoll();
  if (method == 'short_poll') { setInterval(shortPoll, 2000); }
  else if (method == 'long_poll') { longPoll(); }
  else if (method == 'sse') {
    new EventSource("/messages/sse").addEventListener("message", function (e) { setText(e.data); });
  } else if (method == 'ws') {
    socket = new WebSocket("ws://" + location.host + "/chat");
    socket.onmessage = function (e) { setText(e.data); };
  }
  var input = document.getElementById("text");
  document.getElementById("button").onclick = function () {
    if (!input.value) { return; }
    if (socket) { socket.send(input.value); }
    else { fetch("/say", {method: "post", body: input.value}); }
    input.value = "";
  };
};
</script>
</body>
</html>
"#;
