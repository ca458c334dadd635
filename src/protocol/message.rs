//! Wire messages exchanged with the hosting server.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Raw header list: lower-cased name and value byte strings.
pub type RawHeaders = Vec<(Bytes, Bytes)>;

/// Close code used when nobody specified one.
pub const NORMAL_CLOSURE: u16 = 1000;

/// A single protocol message, keyed by its `type` discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "lifespan.startup")]
    LifespanStartup,

    #[serde(rename = "lifespan.startup.complete")]
    LifespanStartupComplete,

    #[serde(rename = "lifespan.shutdown")]
    LifespanShutdown,

    #[serde(rename = "lifespan.shutdown.complete")]
    LifespanShutdownComplete,

    #[serde(rename = "http.request")]
    HttpRequest {
        #[serde(default)]
        body: Bytes,
        #[serde(default)]
        more_body: bool,
    },

    #[serde(rename = "http.disconnect")]
    HttpDisconnect,

    #[serde(rename = "http.response.start")]
    HttpResponseStart { status: u16, headers: RawHeaders },

    #[serde(rename = "http.response.body")]
    HttpResponseBody {
        #[serde(default)]
        body: Bytes,
        #[serde(default)]
        more_body: bool,
    },

    #[serde(rename = "websocket.connect")]
    WebsocketConnect,

    #[serde(rename = "websocket.receive")]
    WebsocketReceive {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bytes: Option<Bytes>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },

    #[serde(rename = "websocket.disconnect")]
    WebsocketDisconnect {
        #[serde(default = "normal_closure")]
        code: u16,
    },

    #[serde(rename = "websocket.accept")]
    WebsocketAccept {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subprotocol: Option<String>,
    },

    #[serde(rename = "websocket.send")]
    WebsocketSend {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bytes: Option<Bytes>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },

    #[serde(rename = "websocket.close")]
    WebsocketClose {
        #[serde(default = "normal_closure")]
        code: u16,
    },
}

fn normal_closure() -> u16 {
    NORMAL_CLOSURE
}

impl Message {
    /// The wire `type` of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::LifespanStartup => "lifespan.startup",
            Message::LifespanStartupComplete => "lifespan.startup.complete",
            Message::LifespanShutdown => "lifespan.shutdown",
            Message::LifespanShutdownComplete => "lifespan.shutdown.complete",
            Message::HttpRequest { .. } => "http.request",
            Message::HttpDisconnect => "http.disconnect",
            Message::HttpResponseStart { .. } => "http.response.start",
            Message::HttpResponseBody { .. } => "http.response.body",
            Message::WebsocketConnect => "websocket.connect",
            Message::WebsocketReceive { .. } => "websocket.receive",
            Message::WebsocketDisconnect { .. } => "websocket.disconnect",
            Message::WebsocketAccept { .. } => "websocket.accept",
            Message::WebsocketSend { .. } => "websocket.send",
            Message::WebsocketClose { .. } => "websocket.close",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let msg = Message::HttpResponseBody {
            body: Bytes::from_static(b"hi"),
            more_body: false,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "http.response.body");
        assert_eq!(value["more_body"], false);
        assert_eq!(msg.kind(), "http.response.body");
    }

    #[test]
    fn absent_fields_take_defaults() {
        let msg: Message = serde_json::from_str(r#"{"type": "websocket.disconnect"}"#).unwrap();
        assert_eq!(msg, Message::WebsocketDisconnect { code: 1000 });

        let msg: Message = serde_json::from_str(r#"{"type": "websocket.receive", "text": "hey"}"#).unwrap();
        assert_eq!(
            msg,
            Message::WebsocketReceive {
                bytes: None,
                text: Some("hey".into())
            }
        );
    }
}
