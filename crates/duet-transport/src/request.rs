//! The HTTP upgrade request a connection was opened with.

use std::collections::HashMap;

/// Length a `token` query parameter must have to be honored.
pub const TOKEN_LEN: usize = 32;

/// Path, query and client address captured during the WebSocket upgrade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Request path, e.g. `/room`.
    pub path: String,
    /// Decoded query parameters. Later duplicates overwrite earlier ones.
    pub query: HashMap<String, String>,
    /// Client address used for identity and connection limits.
    pub ip: String,
}

impl ConnectRequest {
    /// Builds a request from a raw path-and-query string such as
    /// `/room?id=5&token=...`.
    pub fn parse(path_and_query: &str, ip: impl Into<String>) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, query),
            None => (path_and_query, ""),
        };

        let query = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect();

        Self {
            path: path.to_string(),
            query,
            ip: ip.into(),
        }
    }

    /// Returns the `token` parameter if it has exactly [`TOKEN_LEN`] chars.
    pub fn token(&self) -> Option<&str> {
        self.query
            .get("token")
            .map(String::as_str)
            .filter(|t| t.chars().count() == TOKEN_LEN)
    }

    /// Returns the `id` parameter parsed as a room id.
    pub fn room_id(&self) -> Option<u32> {
        self.query.get("id").and_then(|id| id.parse().ok())
    }
}

/// Picks the client address: the first `X-Forwarded-For` hop when trusted,
/// otherwise the socket peer.
pub(crate) fn client_ip(forwarded_for: Option<&str>, peer: &str) -> String {
    forwarded_for
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(peer)
        .to_string()
}
