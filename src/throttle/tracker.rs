//! Client identity derivation.

use axum::http::{HeaderMap, Method};

/// Identity used when the connection address is not available.
pub const UNKNOWN_TRACKER: &str = "unknown";

/// The address and route information of one inbound request.
///
/// Built once per request and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    /// HTTP method
    pub method: Method,
    /// Request path, without query string
    pub path: String,
    /// Address of the peer that opened the connection
    pub remote_addr: Option<String>,
    /// Forwarded client addresses, original client first
    pub forwarded_for: Vec<String>,
}

impl RequestInfo {
    pub fn new(method: Method, path: impl Into<String>, remote_addr: Option<String>) -> Self {
        Self {
            method,
            path: path.into(),
            remote_addr,
            forwarded_for: Vec::new(),
        }
    }

    /// Attach a forwarded-address chain.
    pub fn with_forwarded_for<I, S>(mut self, addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forwarded_for = addrs.into_iter().map(Into::into).collect();
        self
    }
}

/// A key that buckets one client's requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve the tracker for a request.
///
/// The left-most forwarded address wins; without one the direct peer
/// address is used.
pub fn resolve_tracker(request: &RequestInfo) -> ClientIdentity {
    if let Some(first) = request.forwarded_for.first() {
        return ClientIdentity::new(first.as_str());
    }

    ClientIdentity::new(
        request
            .remote_addr
            .as_deref()
            .unwrap_or(UNKNOWN_TRACKER),
    )
}

/// Parse a forwarded-address chain out of every instance of `header`.
///
/// Values are comma separated; blanks and non-UTF-8 values are skipped.
pub fn parse_forwarded_for(headers: &HeaderMap, header: &str) -> Vec<String> {
    headers
        .get_all(header)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(str::to_string)
        .collect()
}
