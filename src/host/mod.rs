//! Reference host: serves a [`Dispatcher`] over real HTTP and WebSocket
//! connections with axum.
//!
//! # Responsibilities
//! - Translate each axum request into a `Scope` plus an in-memory transport
//! - Pump protocol messages between the dispatcher and the connection
//! - Run the lifespan handshake around the accept loop
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → axum (TraceLayer) → fallback handler
//!         upgrade request → websocket.rs bridge
//!         anything else   → http.rs bridge
//!     → Dispatcher::dispatch(scope, ChannelTransport) on its own task
//! ```
//!
//! # Design Decisions
//! - Every route goes to the dispatcher; routing is the application's job
//! - The dispatcher runs on a spawned task so a vanished client only ever
//!   surfaces as a disconnect message, never as a cancelled handler

mod http;
mod websocket;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Request, State};
use axum::response::Response;
use axum::Router;
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;
use crate::exchange::http::wire_headers;
use crate::lifecycle::Shutdown;
use crate::protocol::{Message, Scope, ScopeKind};
use crate::transport::{channel, Peer};

/// Error type for running the host.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("lifespan {phase} failed: {reason}")]
    Lifespan { phase: &'static str, reason: String },
}

#[derive(Clone)]
struct HostState {
    dispatcher: Dispatcher,
    local_addr: SocketAddr,
}

impl HostState {
    fn scope(&self, kind: ScopeKind, parts: &axum::http::request::Parts) -> Scope {
        let path = percent_decode_str(parts.uri.path()).decode_utf8_lossy();
        let mut scope = match kind {
            ScopeKind::Websocket => Scope::websocket(&path),
            _ => Scope::http(parts.method.as_str(), &path),
        };
        scope.query_string = Bytes::copy_from_slice(parts.uri.query().unwrap_or("").as_bytes());
        scope.server = Some((self.local_addr.ip().to_string(), self.local_addr.port()));
        scope.headers = wire_headers(&parts.headers);
        scope
    }

    /// Start a dispatcher task for `scope`, returning the server-side peer.
    fn spawn(&self, scope: Scope) -> (Peer, JoinHandle<()>) {
        let (transport, peer) = channel();
        let dispatcher = self.dispatcher.clone();
        let task = tokio::spawn(async move { dispatcher.dispatch(scope, Arc::new(transport)).await });
        (peer, task)
    }
}

/// HTTP server for a gateway application.
pub struct GatewayServer {
    dispatcher: Dispatcher,
    config: GatewayConfig,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, dispatcher: Dispatcher) -> Self {
        let dispatcher = dispatcher.with_body_limit(config.http.max_body_bytes);
        Self { dispatcher, config }
    }

    /// Build the axum router that forwards everything to the dispatcher.
    pub fn router(&self, local_addr: SocketAddr) -> Router {
        let state = HostState {
            dispatcher: self.dispatcher.clone(),
            local_addr,
        };
        Router::new()
            .fallback(gateway_handler)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the lifespan startup, serve until `shutdown` fires, then run the
    /// lifespan shutdown.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), HostError> {
        let addr = listener.local_addr()?;
        let lifespan = Lifespan::start(&self.dispatcher, self.config.lifespan.timeout()).await?;

        tracing::info!(address = %addr, "Gateway server starting");
        let app = self.router(addr).into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        lifespan.shutdown().await?;
        tracing::info!("Gateway server stopped");
        Ok(())
    }
}

async fn gateway_handler(
    State(state): State<HostState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    request: Request,
) -> Response {
    match upgrade {
        Ok(upgrade) => {
            let (parts, _body) = request.into_parts();
            websocket::bridge(&state, upgrade, &parts).await
        }
        Err(_) => http::bridge(&state, request).await,
    }
}

/// Host side of the lifespan handshake.
struct Lifespan {
    peer: Peer,
    task: JoinHandle<()>,
    timeout: Duration,
}

impl Lifespan {
    async fn start(dispatcher: &Dispatcher, timeout: Duration) -> Result<Self, HostError> {
        let (transport, peer) = channel();
        let dispatcher = dispatcher.clone();
        let task = tokio::spawn(async move { dispatcher.dispatch(Scope::lifespan(), Arc::new(transport)).await });
        let mut lifespan = Self { peer, task, timeout };
        lifespan
            .handshake(Message::LifespanStartup, Message::LifespanStartupComplete, "startup")
            .await?;
        Ok(lifespan)
    }

    async fn shutdown(mut self) -> Result<(), HostError> {
        self.handshake(Message::LifespanShutdown, Message::LifespanShutdownComplete, "shutdown")
            .await?;
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Lifespan task did not finish cleanly");
        }
        Ok(())
    }

    async fn handshake(&mut self, request: Message, expected: Message, phase: &'static str) -> Result<(), HostError> {
        let failed = |reason: String| HostError::Lifespan { phase, reason };
        self.peer
            .send(request)
            .map_err(|e| failed(e.to_string()))?;
        match tokio::time::timeout(self.timeout, self.peer.recv()).await {
            Ok(Some(reply)) if reply == expected => Ok(()),
            Ok(Some(other)) => Err(failed(format!("unexpected reply {}", other.kind()))),
            Ok(None) => Err(failed("application ended the lifespan".to_string())),
            Err(_) => Err(failed(format!("no reply within {:?}", self.timeout))),
        }
    }
}
