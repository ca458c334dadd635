//! Per-connection scope: the connection kind plus immutable metadata.

use bytes::Bytes;

use super::message::RawHeaders;

/// Which state machine a connection belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeKind {
    Http,
    Websocket,
    Lifespan,
    /// Anything this adapter does not know how to drive.
    Other(String),
}

impl ScopeKind {
    pub fn as_str(&self) -> &str {
        match self {
            ScopeKind::Http => "http",
            ScopeKind::Websocket => "websocket",
            ScopeKind::Lifespan => "lifespan",
            ScopeKind::Other(kind) => kind,
        }
    }
}

impl From<&str> for ScopeKind {
    fn from(kind: &str) -> Self {
        match kind {
            "http" => ScopeKind::Http,
            "websocket" => ScopeKind::Websocket,
            "lifespan" => ScopeKind::Lifespan,
            other => ScopeKind::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection metadata handed over by the hosting server.
#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub method: String,
    pub scheme: String,
    /// Server host and port the connection arrived on.
    pub server: Option<(String, u16)>,
    pub root_path: String,
    /// Percent-decoded path.
    pub path: String,
    /// Raw query string, not percent-decoded.
    pub query_string: Bytes,
    pub headers: RawHeaders,
}

impl Scope {
    fn new(kind: ScopeKind, method: &str, scheme: &str, path: &str) -> Self {
        Self {
            kind,
            method: method.to_string(),
            scheme: scheme.to_string(),
            server: None,
            root_path: String::new(),
            path: path.to_string(),
            query_string: Bytes::new(),
            headers: Vec::new(),
        }
    }

    pub fn http(method: &str, path: &str) -> Self {
        Self::new(ScopeKind::Http, method, "http", path)
    }

    pub fn websocket(path: &str) -> Self {
        Self::new(ScopeKind::Websocket, "GET", "ws", path)
    }

    pub fn lifespan() -> Self {
        Self::new(ScopeKind::Lifespan, "", "", "")
    }

    pub fn other(kind: &str) -> Self {
        Self::new(ScopeKind::from(kind), "", "", "")
    }

    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }

    pub fn with_server(mut self, host: &str, port: u16) -> Self {
        self.server = Some((host.to_string(), port));
        self
    }

    pub fn with_root_path(mut self, root_path: &str) -> Self {
        self.root_path = root_path.to_string();
        self
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.query_string = Bytes::copy_from_slice(query.as_bytes());
        self
    }

    /// Append a header; the name is lower-cased like servers do.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((
            Bytes::from(name.to_ascii_lowercase()),
            Bytes::copy_from_slice(value.as_bytes()),
        ));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in ["http", "websocket", "lifespan", "carrier-pigeon"] {
            assert_eq!(ScopeKind::from(kind).as_str(), kind);
        }
        assert_eq!(ScopeKind::from("nope"), ScopeKind::Other("nope".into()));
    }

    #[test]
    fn builder_lowercases_header_names() {
        let scope = Scope::http("GET", "/").with_header("X-Foo", "Bar");
        assert_eq!(scope.headers[0].0, Bytes::from_static(b"x-foo"));
        assert_eq!(scope.headers[0].1, Bytes::from_static(b"Bar"));
    }
}
