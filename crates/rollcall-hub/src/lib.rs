//! The live attendance hub.
//!
//! A single Tokio task (actor) owns the one optional
//! [`AttendanceSession`] and the
//! [`ConnectionRegistry`](rollcall_session::ConnectionRegistry). Everything
//! else talks to it through a cloneable [`HubHandle`], so every mark,
//! summary and finalize is processed one at a time in arrival order.
//!
//! # Key types
//!
//! - [`HubHandle`]: start sessions, register observers, dispatch events
//! - [`AttendanceSession`]: marks, summary, default-fill
//! - [`RosterStore`] / [`AttendanceStore`]: the durable collaborators
//!   consulted at finalize time
//! - [`HubConfig`]: store timeout and command buffer size

mod config;
mod error;
mod hub;
mod session;
mod store;

pub use config::HubConfig;
pub use error::HubError;
pub use hub::{HubHandle, spawn_hub};
pub use session::{AttendanceSession, SessionInfo};
pub use store::{
    AttendanceStore, FinalizedRecord, MemoryAttendanceStore, MemoryRoster,
    RosterStore, StoreError,
};
