//! Error types for the protocol layer.

/// Failure to turn an event into a frame or a frame into an event.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[cfg(feature = "json")]
    #[error("could not encode event: {0}")]
    Encode(serde_json::Error),

    /// Malformed JSON, an event name nobody handles, or a payload of the
    /// wrong shape. The server logs and drops such frames.
    #[cfg(feature = "json")]
    #[error("could not decode frame: {0}")]
    Decode(serde_json::Error),
}
