//! Network layer for Rollcall: listeners, connections and frames.
//!
//! Everything above this crate sees a connection as "something that moves
//! byte frames and remembers the query string it was opened with". The
//! [`Transport`] and [`Connection`] traits capture exactly that.
//!
//! # Feature Flags
//!
//! - `websocket` (default): [`WebSocketTransport`] over `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{PendingWebSocket, WebSocketConnection, WebSocketTransport};

use std::fmt;

/// Server-assigned id of one live connection. Never reused within a
/// process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Source of new connections.
///
/// `accept` only takes the peer off the listener. The upgrade happens in
/// [`PendingConnection::upgrade`], on the caller's own task, so a peer that
/// stalls mid-handshake holds up nobody else.
pub trait Transport: Send + Sync + 'static {
    type Pending: PendingConnection;
    type Error: std::error::Error + Send + Sync;

    async fn accept(&mut self) -> Result<Self::Pending, Self::Error>;
}

/// An accepted peer whose protocol handshake has not run yet.
pub trait PendingConnection: Send + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    async fn upgrade(self) -> Result<Self::Connection, Self::Error>;
}

/// One peer.
///
/// `send` and `recv` may run at the same time on different tasks: a reader
/// can sit in `recv` while a writer pushes broadcasts.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Next data frame. `Ok(None)` once the peer has closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;

    /// Percent-decoded value of `key` in the query string of the request
    /// that opened this connection, e.g. the `token` in `/?token=...`.
    fn query_param(&self, key: &str) -> Option<String>;
}

/// Looks up `key` in a raw query string and percent-decodes its value.
///
/// `+` decodes to a space, as in form encoding. The first occurrence wins;
/// a bare key with no `=` has an empty value.
pub fn parse_query_param(query: &str, key: &str) -> Option<String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .find_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            if k != key {
                return None;
            }
            let v = v.replace('+', " ");
            urlencoding::decode(&v).ok().map(|cow| cow.into_owned())
        })
}
