//! Error taxonomy for the adapter.
//!
//! # Responsibilities
//! - Name every way a handler or an exchange can go wrong
//! - Map each failure to the status used for a last-resort response
//! - Recover our own errors from a handler's boxed error
//!
//! # Design Decisions
//! - `Disconnected` is a normal outcome, never reported as a bug
//! - Handlers return `BoxError` so `?` works on any error type; the driver
//!   downcasts back to [`Error`] to keep the classification

use http::StatusCode;

use crate::transport::TransportError;

/// Boxed error returned by handlers and lazy body streams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias for exchange operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything the adapter can fail with.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The handler produced a response grouping of the wrong shape.
    #[error("{0}")]
    Shape(String),

    /// A value in body position cannot be used as a body.
    #[error("{0}")]
    BodyType(String),

    /// A structured body could not be JSON encoded.
    #[error("could not JSON encode body: {0}")]
    Encode(String),

    /// The exchange's state machine was driven out of order.
    #[error("{0}")]
    Protocol(&'static str),

    /// The peer went away.
    #[error("client disconnected")]
    Disconnected,

    /// Tried to talk to a peer that is already confirmed gone.
    #[error("{0}")]
    ConnectionClosed(&'static str),

    /// Buffering the request body exceeded the caller-imposed limit.
    #[error("request body too large (limit is {limit} bytes)")]
    PayloadTooLarge { limit: usize },

    /// The handler returned a value where it should have returned nothing.
    #[error("{0}")]
    Usage(&'static str),

    /// A value that cannot be sent over a websocket.
    #[error("{0}")]
    Type(&'static str),

    /// The request body was not valid JSON.
    #[error("could not decode JSON: {0}")]
    Decode(#[from] serde_json::Error),

    /// The transport failed for a reason other than a disconnect.
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// The handler's own failure (including a panic).
    #[error("{0}")]
    Handler(BoxError),
}

impl Error {
    /// Short name used in error responses and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Shape(_) => "ShapeError",
            Error::BodyType(_) => "BodyTypeError",
            Error::Encode(_) => "EncodeError",
            Error::Protocol(_) => "ProtocolError",
            Error::Disconnected => "DisconnectedError",
            Error::ConnectionClosed(_) => "ConnectionClosedError",
            Error::PayloadTooLarge { .. } => "PayloadTooLargeError",
            Error::Usage(_) => "UsageError",
            Error::Type(_) => "TypeError",
            Error::Decode(_) => "DecodeError",
            Error::Transport(_) => "TransportError",
            Error::Handler(_) => "HandlerError",
        }
    }

    /// Status for the response sent when this error is caught before headers.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self, Error::Disconnected)
    }

    /// Recover an [`Error`] from a handler's boxed error, wrapping anything
    /// foreign as [`Error::Handler`].
    pub fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<Error>() {
            Ok(err) => *err,
            Err(err) => Error::Handler(err),
        }
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Closed => Error::Disconnected,
            other => Error::Transport(other),
        }
    }
}
