//! Connection identity for Rollcall.
//!
//! This crate answers two questions for the layers above:
//!
//! 1. **Who is this?** The [`Authenticator`] trait turns a credential
//!    into an [`Identity`](rollcall_protocol::Identity).
//!    [`JwtAuthenticator`] is the stock implementation, backed by an
//!    [`IdentityDirectory`].
//! 2. **Who is connected?** [`ConnectionRegistry`] tracks every
//!    authenticated observer and its outbound channel, and fans events
//!    out to them.
//!
//! ```text
//! Hub Layer (above)      ← owns the registry, broadcasts through it
//!     ↕
//! Session Layer (this)   ← identity + observers
//!     ↕
//! Protocol Layer (below) ← Identity, OutboundEvent
//! ```

mod auth;
mod error;
mod registry;

pub use auth::{
    Authenticator, IdentityDirectory, JwtAuthenticator, MemoryDirectory,
    TokenClaims,
};
pub use error::SessionError;
pub use registry::{ConnectionRegistry, Observer, ObserverSender};
