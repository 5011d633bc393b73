//! Wire protocol for Rollcall.
//!
//! Every message on the wire is one JSON object of the form
//! `{"event": <NAME>, "data": <payload>}`. This crate defines:
//!
//! - **Identity types** ([`ClassId`], [`ParticipantId`], [`Role`],
//!   [`Identity`]) shared by every layer above.
//! - **Events** ([`InboundEvent`], [`OutboundEvent`]): closed enums, one
//!   variant per event kind, decoded at the boundary.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): bytes <-> events.
//!
//! ```text
//! Transport (bytes) → Protocol (events) → Hub (session state)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    AttendanceStatus, ClassId, Identity, InboundEvent, MarkRequest, MyStatus,
    OutboundEvent, ParticipantId, Role, Summary, FINALIZED_MESSAGE,
};
