//! Frame codecs.
//!
//! The server is generic over [`Codec`]; [`JsonCodec`] is what browser
//! clients speak.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Converts events to frame bytes and back.
///
/// Lives in shared server state and is used from every connection's
/// reader and writer task.
pub trait Codec: Send + Sync + 'static {
    /// # Errors
    /// [`ProtocolError::Encode`] if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T)
    -> Result<Vec<u8>, ProtocolError>;

    /// # Errors
    /// [`ProtocolError::Decode`] if the bytes are not a `T`.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

/// JSON frames via `serde_json`. Behind the `json` feature (on by default).
///
/// ```rust
/// use rollcall_protocol::{Codec, InboundEvent, JsonCodec};
///
/// let codec = JsonCodec;
/// let event: InboundEvent = codec.decode(br#"{"event":"DONE"}"#).unwrap();
/// assert_eq!(event, InboundEvent::Finalize);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
