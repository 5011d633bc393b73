//! # Rollcall
//!
//! Live attendance over WebSockets.
//!
//! A teacher opens a session for a class, marks students present or absent
//! in real time, and commits the result. Every connected client (teacher
//! and students) sees each mark and the running summary as it happens;
//! students can ask for their own status. On commit the hub fills in
//! everyone left unmarked as absent, persists the lot in one write and
//! tells everyone it is done.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rollcall::prelude::*;
//!
//! # async fn run() -> Result<(), RollcallError> {
//! let config = ServerConfig::from_env()?;
//! let auth = JwtAuthenticator::new(config.jwt_secret.as_bytes(), MemoryDirectory::new());
//! let server = RollcallServerBuilder::from_config(&config)
//!     .build(auth, MemoryRoster::new(), MemoryAttendanceStore::new())
//!     .await?;
//! server.hub().start_session(ClassId::new("C1")).await?;
//! server.run().await
//! # }
//! ```
//!
//! Clients connect to `ws://host/?token=<jwt>` and exchange
//! `{"event": ..., "data": ...}` JSON frames.

mod config;
mod error;
mod handler;
mod server;

pub use config::{
    BIND_ADDR_KEY, ConfigError, HANDSHAKE_TIMEOUT_KEY, IDLE_TIMEOUT_KEY, JWT_SECRET_KEY,
    STORE_TIMEOUT_KEY, ServerConfig,
};
pub use error::RollcallError;
pub use handler::UNAUTHORIZED_MESSAGE;
pub use server::{RollcallServer, RollcallServerBuilder};

/// Everything needed to run a server and talk to its hub.
pub mod prelude {
    pub use crate::{
        ConfigError, RollcallError, RollcallServer, RollcallServerBuilder,
        ServerConfig, UNAUTHORIZED_MESSAGE,
    };
    pub use rollcall_hub::{
        AttendanceSession, AttendanceStore, FinalizedRecord, HubConfig,
        HubError, HubHandle, MemoryAttendanceStore, MemoryRoster, RosterStore,
        SessionInfo, StoreError,
    };
    pub use rollcall_protocol::{
        AttendanceStatus, ClassId, Codec, Identity, InboundEvent, JsonCodec,
        MarkRequest, MyStatus, OutboundEvent, ParticipantId, Role, Summary,
    };
    pub use rollcall_session::{
        Authenticator, IdentityDirectory, JwtAuthenticator, MemoryDirectory,
        SessionError,
    };
    pub use rollcall_transport::ConnectionId;
}
