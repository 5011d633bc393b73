//! Error types for the transport layer.

/// Errors raised while listening, upgrading, or moving frames.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listener could not be bound.
    #[error("could not bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The TCP accept itself failed.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// The peer connected but the WebSocket upgrade did not complete.
    #[error("websocket upgrade failed: {0}")]
    Upgrade(String),

    /// The peer did not finish the upgrade in time.
    #[error("websocket handshake timed out after {0:?}")]
    HandshakeTimeout(std::time::Duration),

    /// The peer is gone; nothing more can be sent.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),
}

impl TransportError {
    /// Whether the peer simply went away, as opposed to a local fault.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TransportError::ConnectionClosed(_))
    }
}
