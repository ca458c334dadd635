//! Connection dispatch: one driver per scope kind.
//!
//! # Data Flow
//! ```text
//! host: (Scope, Transport)
//!     → Dispatcher::dispatch
//!         http      → http::drive      (handler → normalize → send)
//!         websocket → websocket::drive (handler → defensive close)
//!         lifespan  → lifespan::run    (startup / shutdown handshake)
//!         other     → reported, ignored
//! ```
//!
//! # Design Decisions
//! - The dispatcher is the failure boundary: handler errors and panics are
//!   converted to a response (or a clean truncation) and reported, never
//!   propagated to the host
//! - Reporter and body limit are explicit, per-dispatcher settings

pub mod http;
pub mod lifespan;
pub mod websocket;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use crate::error::{BoxError, Error, Result};
use crate::exchange::{ExchangeId, HttpExchange, Request, WebsocketExchange, DEFAULT_BODY_LIMIT};
use crate::observability::metrics::{self, ActiveExchange};
use crate::observability::{Event, Reporter, TracingReporter};
use crate::protocol::{Scope, ScopeKind};
use crate::response::Response;
use crate::transport::Transport;

/// What a handler returns: a response, or `None` when it already sent one
/// through the exchange (always `None` for websockets).
pub type HandlerResult = std::result::Result<Option<Response>, BoxError>;

/// Application entry point, called once per HTTP or websocket connection.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Request) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, request: Request) -> BoxFuture<'static, HandlerResult> {
        self(request).boxed()
    }
}

/// Shorthand for returning a response from a handler.
pub fn reply(response: impl Into<Response>) -> HandlerResult {
    Ok(Some(response.into()))
}

/// Routes each connection to the driver for its kind.
#[derive(Clone)]
pub struct Dispatcher {
    handler: Arc<dyn Handler>,
    reporter: Arc<dyn Reporter>,
    body_limit: usize,
}

impl Dispatcher {
    pub fn new(handler: impl Handler) -> Self {
        Self {
            handler: Arc::new(handler),
            reporter: Arc::new(TracingReporter),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_reporter(mut self, reporter: impl Reporter) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Default limit for `HttpExchange::body()` on exchanges created here.
    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }

    pub fn reporter(&self) -> &dyn Reporter {
        self.reporter.as_ref()
    }

    /// Drive one connection to completion. Never fails: every error is
    /// converted or reported on the way.
    pub async fn dispatch(&self, scope: Scope, transport: Arc<dyn Transport>) {
        match scope.kind.clone() {
            ScopeKind::Http => {
                metrics::record_exchange("http");
                let _active = ActiveExchange::start();
                let exchange = HttpExchange::with_body_limit(scope, transport, self.body_limit);
                http::drive(self, exchange).await;
            }
            ScopeKind::Websocket => {
                metrics::record_exchange("websocket");
                let _active = ActiveExchange::start();
                let exchange = WebsocketExchange::new(scope, transport);
                websocket::drive(self, exchange).await;
            }
            ScopeKind::Lifespan => lifespan::run(self.reporter(), transport.as_ref()).await,
            ScopeKind::Other(kind) => self.reporter.report(&Event::UnknownScope(kind)),
        }
    }

    /// Run the handler, turning its error or panic into an [`Error`].
    async fn call_handler(&self, request: Request) -> Result<Option<Response>> {
        let handler = Arc::clone(&self.handler);
        match AssertUnwindSafe(async move { handler.call(request).await })
            .catch_unwind()
            .await
        {
            Ok(result) => result.map_err(Error::from_boxed),
            Err(panic) => Err(panic_error(panic)),
        }
    }

    /// Report a converted failure; returns the `"<Kind> in <phase>: <msg>"` text.
    fn report_failure(&self, id: ExchangeId, phase: &'static str, err: &Error) -> String {
        let message = format!("{} in {}: {}", err.kind(), phase, err);
        metrics::record_exchange_error(phase);
        self.reporter.report(&Event::ExchangeFailed {
            id,
            phase,
            message: message.clone(),
        });
        message
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("body_limit", &self.body_limit).finish()
    }
}

pub(crate) fn panic_error(payload: Box<dyn Any + Send>) -> Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    Error::Handler(format!("handler panicked: {message}").into())
}
