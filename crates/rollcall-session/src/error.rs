//! Error types for the session layer.

use rollcall_protocol::ParticipantId;
use rollcall_transport::ConnectionId;

/// Errors raised while establishing who is on a connection and while
/// tracking connected observers.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The connection request carried no credential at all.
    #[error("missing credential")]
    MissingCredential,

    /// The credential was rejected (bad signature, expired, malformed).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The credential was valid but the identity it names is gone.
    #[error("identity {0} no longer exists")]
    IdentityNotFound(ParticipantId),

    /// A connection with this id is already registered.
    #[error("connection {0} is already registered")]
    DuplicateConnection(ConnectionId),

    /// Minting a credential failed.
    #[error("could not issue token: {0}")]
    TokenIssue(String),
}

impl SessionError {
    /// Whether this error means the peer failed to authenticate, as
    /// opposed to a server-side fault.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            SessionError::MissingCredential
                | SessionError::AuthFailed(_)
                | SessionError::IdentityNotFound(_)
        )
    }
}
