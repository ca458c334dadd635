//! Connection-state adapter between a gateway protocol and async handlers.
//!
//! A hosting server hands each connection over as a [`protocol::Scope`]
//! plus a [`transport::Transport`]; the [`dispatch::Dispatcher`] drives it
//! through an HTTP or websocket state machine and calls one handler.
//!
//! ```text
//! host ──Scope + Transport──▶ Dispatcher ──Request──▶ handler
//!                                 │                      │
//!                                 ▼                      ▼
//!                        response normalization   HttpExchange / WebsocketExchange
//!                                                        │
//!                                                 WaitableRegistry (broadcast, wake)
//! ```

// Protocol core
pub mod error;
pub mod exchange;
pub mod protocol;
pub mod response;
pub mod transport;

// Driving
pub mod dispatch;
pub mod host;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use dispatch::{reply, Dispatcher, Handler, HandlerResult};
pub use error::{BoxError, Error};
pub use exchange::{HttpExchange, Request, WaitableRegistry, WebsocketExchange};
pub use host::GatewayServer;
pub use lifecycle::Shutdown;
pub use response::{Body, Response};
