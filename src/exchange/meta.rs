//! Read-only connection metadata exposed to handlers.

use std::collections::HashMap;
use std::sync::OnceLock;

use ::http::{HeaderMap, HeaderName, HeaderValue};

use crate::protocol::Scope;

/// Method, URL parts, headers and query of a connection, parsed lazily.
#[derive(Debug)]
pub struct ConnectionInfo {
    scope: Scope,
    headers: OnceLock<HeaderMap>,
    querylist: OnceLock<Vec<(String, String)>>,
}

impl ConnectionInfo {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            headers: OnceLock::new(),
            querylist: OnceLock::new(),
        }
    }

    /// The raw scope this connection was opened with.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// HTTP method, e.g. `GET`.
    pub fn method(&self) -> &str {
        &self.scope.method
    }

    /// URL scheme, e.g. `http` or `wss`.
    pub fn scheme(&self) -> &str {
        &self.scope.scheme
    }

    /// Requested host name from the `host` header, falling back to the
    /// server address. Never includes a port.
    pub fn host(&self) -> &str {
        let host = self
            .headers()
            .get(::http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| self.scope.server.as_ref().map(|(host, _)| host.as_str()))
            .unwrap_or("");
        host.split(':').next().unwrap_or(host)
    }

    /// Server port; derived from the `host` header or the scheme when the
    /// server did not report one.
    pub fn port(&self) -> u16 {
        if let Some((_, port)) = &self.scope.server {
            return *port;
        }
        let from_header = self
            .headers()
            .get(::http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .and_then(|h| h.rsplit_once(':'))
            .and_then(|(_, port)| port.parse().ok());
        from_header.unwrap_or(match self.scheme() {
            "https" | "wss" => 443,
            _ => 80,
        })
    }

    /// Path including the root path, percent escapes decoded.
    pub fn path(&self) -> String {
        format!("{}{}", self.scope.root_path, self.scope.path)
    }

    /// Request headers; names are lower-case. Entries that are not valid
    /// header bytes are skipped.
    pub fn headers(&self) -> &HeaderMap {
        self.headers.get_or_init(|| {
            let mut map = HeaderMap::with_capacity(self.scope.headers.len());
            for (name, value) in &self.scope.headers {
                match (HeaderName::from_bytes(name), HeaderValue::from_bytes(value)) {
                    (Ok(name), Ok(value)) => {
                        map.insert(name, value);
                    }
                    _ => tracing::debug!(header = ?name, "Skipping invalid request header"),
                }
            }
            map
        })
    }

    /// Query parameters in order; pairs with an empty value are dropped.
    pub fn querylist(&self) -> &[(String, String)] {
        self.querylist.get_or_init(|| {
            url::form_urlencoded::parse(&self.scope.query_string)
                .filter(|(_, value)| !value.is_empty())
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect()
        })
    }

    /// Query parameters as a map; the last value for a key wins.
    pub fn querydict(&self) -> HashMap<String, String> {
        self.querylist().iter().cloned().collect()
    }

    /// Full unquoted URL: scheme, host, port, path and query.
    pub fn url(&self) -> String {
        let mut url = format!("{}://{}:{}{}", self.scheme(), self.host(), self.port(), self.path());
        let query = self.querylist();
        if !query.is_empty() {
            let pairs: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
            url.push('?');
            url.push_str(&pairs.join("&"));
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> ConnectionInfo {
        ConnectionInfo::new(
            Scope::http("POST", "/yy")
                .with_root_path("/xx")
                .with_server("127.0.0.1", 8080)
                .with_query("arg=3&arg=4&empty=&sp=a%20b")
                .with_header("Host", "example.com:8080")
                .with_header("User-Agent", "test"),
        )
    }

    #[test]
    fn url_parts() {
        let info = info();
        assert_eq!(info.method(), "POST");
        assert_eq!(info.scheme(), "http");
        assert_eq!(info.host(), "example.com");
        assert_eq!(info.port(), 8080);
        assert_eq!(info.path(), "/xx/yy");
        assert_eq!(info.url(), "http://example.com:8080/xx/yy?arg=3&arg=4&sp=a b");
    }

    #[test]
    fn headers_and_query() {
        let info = info();
        assert_eq!(info.headers()["user-agent"], "test");
        assert_eq!(
            info.querylist(),
            &[
                ("arg".to_string(), "3".to_string()),
                ("arg".to_string(), "4".to_string()),
                ("sp".to_string(), "a b".to_string()),
            ]
        );
        assert_eq!(info.querydict()["arg"], "4");
    }

    #[test]
    fn host_falls_back_to_server() {
        let info = ConnectionInfo::new(Scope::http("GET", "/").with_server("10.0.0.1", 9000));
        assert_eq!(info.host(), "10.0.0.1");
        assert_eq!(info.port(), 9000);

        let info = ConnectionInfo::new(Scope::http("GET", "/").with_scheme("https"));
        assert_eq!(info.port(), 443);
    }
}
