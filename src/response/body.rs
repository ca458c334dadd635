//! Response bodies, content-type inference and materialization.

use bytes::Bytes;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use serde::Serialize;

use crate::error::{BoxError, Error, Result};

/// Lazy, finite, non-restartable sequence of body chunks.
pub type ChunkStream = BoxStream<'static, std::result::Result<Chunk, BoxError>>;

/// A single piece of a streamed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Bytes(Bytes),
    Text(String),
}

impl Chunk {
    pub fn into_bytes(self) -> Bytes {
        match self {
            Chunk::Bytes(bytes) => bytes,
            Chunk::Text(text) => Bytes::from(text),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Chunk::Bytes(bytes) => bytes.len(),
            Chunk::Text(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Bytes> for Chunk {
    fn from(bytes: Bytes) -> Self {
        Chunk::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(bytes: Vec<u8>) -> Self {
        Chunk::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Chunk {
    fn from(bytes: &'static [u8]) -> Self {
        Chunk::Bytes(Bytes::from_static(bytes))
    }
}

impl From<String> for Chunk {
    fn from(text: String) -> Self {
        Chunk::Text(text)
    }
}

impl From<&str> for Chunk {
    fn from(text: &str) -> Self {
        Chunk::Text(text.to_string())
    }
}

/// A structured body, serialized up front so encoding failures surface
/// when the response is materialized.
#[derive(Debug, Clone)]
pub struct JsonBody(std::result::Result<serde_json::Value, String>);

impl JsonBody {
    pub fn new<T: Serialize + ?Sized>(value: &T) -> Self {
        Self(serde_json::to_value(value).map_err(|e| e.to_string()))
    }

    fn encode(self) -> Result<Bytes> {
        let value = self.0.map_err(Error::Encode)?;
        serde_json::to_vec(&value)
            .map(Bytes::from)
            .map_err(|e| Error::Encode(e.to_string()))
    }
}

/// The body part of a response.
pub enum Body {
    Bytes(Bytes),
    Text(String),
    Json(JsonBody),
    Stream(ChunkStream),
}

impl Body {
    pub fn empty() -> Self {
        Body::Bytes(Bytes::new())
    }

    /// Structured body, encoded as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        Body::Json(JsonBody::new(value))
    }

    /// Lazy body from an async stream of chunks.
    pub fn stream<S, C, E>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<C, E>> + Send + 'static,
        C: Into<Chunk>,
        E: Into<BoxError>,
    {
        Body::Stream(
            stream
                .map(|item| item.map(Into::into).map_err(Into::into))
                .boxed(),
        )
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Body::Stream(_))
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            Body::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Body::Json(json) => f.debug_tuple("Json").field(json).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Body::Bytes(Bytes::from_static(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::Json(JsonBody(Ok(value)))
    }
}

impl From<ChunkStream> for Body {
    fn from(stream: ChunkStream) -> Self {
        Body::Stream(stream)
    }
}

const HTML_MARKERS: [&str; 3] = ["<!DOCTYPE html>", "<!doctype html>", "<html>"];

/// Content type for a response that did not set one.
pub fn guess_content_type(body: &Body) -> &'static str {
    match body {
        Body::Text(text) if HTML_MARKERS.iter().any(|m| text.starts_with(m)) => "text/html",
        Body::Text(_) => "text/plain",
        Body::Json(_) => "application/json",
        Body::Bytes(_) | Body::Stream(_) => "application/octet-stream",
    }
}

/// A body ready for transmission.
pub enum Payload {
    Full(Bytes),
    Streaming(ChunkStream),
}

/// Turn a body into bytes, or keep it as a stream to be sent in chunks.
pub fn materialize(body: Body) -> Result<Payload> {
    match body {
        Body::Bytes(bytes) => Ok(Payload::Full(bytes)),
        Body::Text(text) => Ok(Payload::Full(Bytes::from(text))),
        Body::Json(json) => json.encode().map(Payload::Full),
        Body::Stream(stream) => Ok(Payload::Streaming(stream)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn full(body: Body) -> Bytes {
        match materialize(body).unwrap() {
            Payload::Full(bytes) => bytes,
            Payload::Streaming(_) => panic!("expected a full body"),
        }
    }

    #[test]
    fn content_type_inference() {
        assert_eq!(guess_content_type(&"hi".into()), "text/plain");
        assert_eq!(guess_content_type(&"<!DOCTYPE html> <html>foo</html>".into()), "text/html");
        assert_eq!(guess_content_type(&"<!doctype html>".into()), "text/html");
        assert_eq!(guess_content_type(&"<html>foo</html>".into()), "text/html");
        assert_eq!(guess_content_type(&" <html>".into()), "text/plain");
        assert_eq!(guess_content_type(&Body::json(&[1, 2])), "application/json");
        assert_eq!(guess_content_type(&Body::from(vec![1u8])), "application/octet-stream");
        let stream = Body::stream(futures_util::stream::iter(vec![Ok::<_, BoxError>("x")]));
        assert_eq!(guess_content_type(&stream), "application/octet-stream");
    }

    #[test]
    fn text_is_utf8_encoded() {
        assert_eq!(full("héllo".into()), Bytes::from("héllo".as_bytes().to_vec()));
    }

    #[test]
    fn json_round_trip() {
        let value = serde_json::json!({"foo": 42, "bar": [1, 2, {"baz": null}]});
        let bytes = full(Body::json(&value));
        let decoded: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn unencodable_json_fails_with_encode_error() {
        let mut map = HashMap::new();
        map.insert(vec![1u8, 2], "bytes as keys");
        let err = materialize(Body::json(&map)).err().unwrap();
        assert_eq!(err.kind(), "EncodeError");
        assert!(err.to_string().to_lowercase().contains("could not json encode"));
    }

    #[test]
    fn streams_are_not_polled() {
        let stream = Body::stream(futures_util::stream::iter(vec![Ok::<_, BoxError>("x")]));
        assert!(matches!(materialize(stream).unwrap(), Payload::Streaming(_)));
    }
}
