//! Unified error type for Rollcall.

use rollcall_hub::HubError;
use rollcall_protocol::ProtocolError;
use rollcall_session::SessionError;
use rollcall_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RollcallError {
    /// Accept, send or receive failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The connection could not be authenticated or registered.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The hub rejected an operation or has stopped.
    #[error(transparent)]
    Hub(#[from] HubError),

    /// The environment held an invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
