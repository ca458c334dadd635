//! Non-owning broadcast set of live exchanges.
//!
//! # Responsibilities
//! - Let one task reach many long-lived exchanges (wake sleepers, broadcast)
//! - Never keep a finished exchange alive
//!
//! # Design Decisions
//! - Members are weak handles keyed by exchange ID in a `DashMap`, so
//!   mutation is lock-striped and never suspends
//! - Exchanges remove themselves on teardown; weak upgrade failure covers
//!   handles that vanish some other way
//! - Iteration snapshots live members, so no map lock is held while the
//!   caller awaits on them

use std::sync::{Arc, Weak};

use dashmap::DashMap;

use super::http::HttpInner;
use super::websocket::WsInner;
use super::{ExchangeId, HttpExchange, Request, WebsocketExchange};

/// Anything that can be placed in a [`WaitableRegistry`].
pub trait Waitable {
    fn to_request(&self) -> Request;
}

impl Waitable for Request {
    fn to_request(&self) -> Request {
        self.clone()
    }
}

impl Waitable for HttpExchange {
    fn to_request(&self) -> Request {
        Request::Http(self.clone())
    }
}

impl Waitable for WebsocketExchange {
    fn to_request(&self) -> Request {
        Request::Websocket(self.clone())
    }
}

/// Weak handle to a registered exchange.
pub(crate) enum Member {
    Http(Weak<HttpInner>),
    Websocket(Weak<WsInner>),
}

impl Member {
    fn upgrade(&self) -> Option<Request> {
        match self {
            Member::Http(weak) => weak.upgrade().map(|inner| Request::Http(HttpExchange::from_inner(inner))),
            Member::Websocket(weak) => weak
                .upgrade()
                .map(|inner| Request::Websocket(WebsocketExchange::from_inner(inner))),
        }
    }

    fn is_live(&self) -> bool {
        match self {
            Member::Http(weak) => weak.strong_count() > 0,
            Member::Websocket(weak) => weak.strong_count() > 0,
        }
    }
}

#[derive(Default)]
pub(crate) struct RegistryInner {
    members: DashMap<ExchangeId, Member>,
}

impl RegistryInner {
    pub(crate) fn remove(&self, id: ExchangeId) {
        self.members.remove(&id);
    }
}

/// A set of exchanges that does not keep its members alive.
///
/// Cloning yields another handle to the same set.
#[derive(Clone, Default)]
pub struct WaitableRegistry {
    inner: Arc<RegistryInner>,
}

impl WaitableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an exchange. Adding one that was already torn down is a no-op.
    pub fn add(&self, exchange: &impl Waitable) {
        let request = exchange.to_request();
        let id = request.id();
        let added = request.core().register(&self.inner, || {
            self.inner.members.insert(id, request.member());
        });
        if !added {
            tracing::debug!(exchange_id = %id, "Ignoring registration of finished exchange");
        }
    }

    pub fn discard(&self, exchange: &impl Waitable) {
        self.inner.remove(exchange.to_request().id());
    }

    pub fn clear(&self) {
        self.inner.members.clear();
    }

    pub fn contains(&self, exchange: &impl Waitable) -> bool {
        self.inner
            .members
            .get(&exchange.to_request().id())
            .is_some_and(|member| member.is_live())
    }

    /// Number of live members.
    pub fn len(&self) -> usize {
        self.inner.members.iter().filter(|m| m.value().is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the live members.
    pub fn members(&self) -> Vec<Request> {
        self.inner
            .members
            .iter()
            .filter_map(|m| m.value().upgrade())
            .collect()
    }

    pub fn iter(&self) -> std::vec::IntoIter<Request> {
        self.members().into_iter()
    }

    /// Wake every sleeping HTTP member.
    pub fn wake_all(&self) {
        for member in self.iter() {
            if let Request::Http(http) = member {
                http.wake();
            }
        }
    }
}

impl IntoIterator for &WaitableRegistry {
    type Item = Request;
    type IntoIter = std::vec::IntoIter<Request>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl std::fmt::Debug for WaitableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitableRegistry").field("len", &self.len()).finish()
    }
}
