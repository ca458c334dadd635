//! Per-connection exchanges and the registry that groups them.
//!
//! # Responsibilities
//! - Track each connection's client-side and application-side state
//! - Refuse any call that would put an illegal message on the wire
//! - Release registry membership exactly once when the connection ends
//!
//! # Data Flow
//! ```text
//! Dispatcher creates exchange (Scope + Transport)
//!     → handler drives it (accept / send / receive / sleep_until)
//!     → other tasks find it through a WaitableRegistry (wake / send)
//!     → driver drops its TeardownGuard → registrations released
//! ```
//!
//! # Design Decisions
//! - Handles are cheap clones of an `Arc`; state locks are never held
//!   across an await
//! - Registries hold weak handles; exchanges hold weak back-references

pub mod http;
pub mod meta;
pub mod registry;
pub mod websocket;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::protocol::Scope;
use crate::transport::Transport;

pub use self::http::{AppState, ClientState, HttpExchange, DEFAULT_BODY_LIMIT};
pub use self::meta::ConnectionInfo;
pub use self::registry::{Waitable, WaitableRegistry};
pub use self::websocket::{SocketState, WebsocketExchange, WsMessage, WsValue};

use self::registry::{Member, RegistryInner};

/// Global counter for exchange IDs; only uniqueness matters.
static EXCHANGE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExchangeId(u64);

impl ExchangeId {
    pub fn new() -> Self {
        Self(EXCHANGE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ExchangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "exchange-{}", self.0)
    }
}

/// State shared by both exchange kinds.
pub(crate) struct ExchangeCore {
    pub(crate) id: ExchangeId,
    pub(crate) info: ConnectionInfo,
    pub(crate) transport: Arc<dyn Transport>,
    /// Registries this exchange was added to; `None` once torn down.
    registrations: Mutex<Option<Vec<Weak<RegistryInner>>>>,
}

impl ExchangeCore {
    pub(crate) fn new(scope: Scope, transport: Arc<dyn Transport>) -> Self {
        Self {
            id: ExchangeId::new(),
            info: ConnectionInfo::new(scope),
            transport,
            registrations: Mutex::new(Some(Vec::new())),
        }
    }

    /// Run `insert` and record the back-reference, unless already torn down.
    pub(crate) fn register(&self, registry: &Arc<RegistryInner>, insert: impl FnOnce()) -> bool {
        let mut registrations = lock(&self.registrations);
        let Some(list) = registrations.as_mut() else {
            return false;
        };
        insert();
        let weak = Arc::downgrade(registry);
        if !list.iter().any(|r| r.ptr_eq(&weak)) {
            list.push(weak);
        }
        true
    }

    /// Remove this exchange from every registry it joined. Idempotent.
    pub(crate) fn teardown(&self) {
        let taken = lock(&self.registrations).take();
        let Some(registries) = taken else {
            return;
        };
        for registry in registries.iter().filter_map(Weak::upgrade) {
            registry.remove(self.id);
        }
        tracing::trace!(exchange_id = %self.id, registries = registries.len(), "Exchange torn down");
    }
}

/// Lock a std mutex, recovering the data if a panicking task poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The value handed to a handler: one live exchange of either kind.
#[derive(Clone)]
pub enum Request {
    Http(HttpExchange),
    Websocket(WebsocketExchange),
}

impl Request {
    pub fn id(&self) -> ExchangeId {
        self.core().id
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.core().info
    }

    pub fn as_http(&self) -> Option<&HttpExchange> {
        match self {
            Request::Http(http) => Some(http),
            Request::Websocket(_) => None,
        }
    }

    pub fn as_websocket(&self) -> Option<&WebsocketExchange> {
        match self {
            Request::Websocket(ws) => Some(ws),
            Request::Http(_) => None,
        }
    }

    pub(crate) fn core(&self) -> &ExchangeCore {
        match self {
            Request::Http(http) => http.core(),
            Request::Websocket(ws) => ws.core(),
        }
    }

    pub(crate) fn member(&self) -> Member {
        match self {
            Request::Http(http) => Member::Http(http.downgrade()),
            Request::Websocket(ws) => Member::Websocket(ws.downgrade()),
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::Http(http) => http.fmt(f),
            Request::Websocket(ws) => ws.fmt(f),
        }
    }
}

/// Tears the exchange down when dropped, whichever way the driver exits
/// (return, error, panic or cancellation).
pub(crate) struct TeardownGuard {
    request: Request,
}

impl TeardownGuard {
    pub(crate) fn new(request: Request) -> Self {
        Self { request }
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        self.request.core().teardown();
    }
}
