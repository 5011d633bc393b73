//! Error types for the hub layer.
//!
//! The `Display` text of the event-level variants is exactly what the
//! requesting client receives in its `ERROR` event.

use rollcall_protocol::{ClassId, Role};
use rollcall_session::SessionError;
use rollcall_transport::ConnectionId;

/// Errors that can occur while handling hub operations.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The caller's role may not send this event.
    #[error("Forbidden, {0} event only")]
    Forbidden(Role),

    /// The event needs a session and none is active.
    #[error("No active attendance session")]
    NoActiveSession,

    /// A session was requested while one is already running.
    #[error("an attendance session is already active for class {0}")]
    SessionAlreadyActive(ClassId),

    /// The roster has no class with this id.
    #[error("Class not found")]
    ClassNotFound(ClassId),

    /// The roster could not be read (backend error or timeout).
    #[error("Roster unavailable: {0}")]
    RosterUnavailable(String),

    /// The bulk write of finalized records failed or timed out.
    #[error("Failed to persist attendance: {0}")]
    PersistenceFailure(String),

    /// The connection never completed registration.
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    /// Registering the observer failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The hub actor has stopped.
    #[error("attendance hub is unavailable")]
    Unavailable,
}

impl HubError {
    /// Whether a finalize failed because of an external dependency. The
    /// session is untouched in that case, so the teacher may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HubError::ClassNotFound(_)
                | HubError::RosterUnavailable(_)
                | HubError::PersistenceFailure(_)
        )
    }
}
