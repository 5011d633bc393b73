//! Core protocol types for Rollcall's wire format.
//!
//! These are the structures that get serialized onto the socket. Field and
//! event names follow the JSON the browser client already speaks, so serde
//! renames carry most of the weight here.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, IgnoredAny};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Opaque identifier of a class (the group a session takes attendance for).
///
/// Serialized as a bare string thanks to `#[serde(transparent)]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub String);

impl ClassId {
    /// Creates a class id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of a participant (teacher or student).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    /// Creates a participant id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The role a participant holds. Every inbound event is gated on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Teacher => f.write_str("teacher"),
            Role::Student => f.write_str("student"),
        }
    }
}

/// Who is on the other end of a connection. Bound once at handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub participant_id: ParticipantId,
    pub role: Role,
}

impl Identity {
    pub fn new(participant_id: impl Into<String>, role: Role) -> Self {
        Self {
            participant_id: ParticipantId::new(participant_id),
            role,
        }
    }

    pub fn teacher(participant_id: impl Into<String>) -> Self {
        Self::new(participant_id, Role::Teacher)
    }

    pub fn student(participant_id: impl Into<String>) -> Self {
        Self::new(participant_id, Role::Student)
    }
}

// ---------------------------------------------------------------------------
// Attendance values
// ---------------------------------------------------------------------------

/// A recorded presence status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    /// Exact, case-sensitive match on the wire values.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            other => Err(format!("unknown attendance status: {other:?}")),
        }
    }
}

/// A student's view of their own mark.
///
/// `NotYetMarked` is distinct from `Absent`: an untouched participant is
/// neither present nor absent until the session is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MyStatus {
    #[serde(rename = "present")]
    Present,
    #[serde(rename = "absent")]
    Absent,
    #[serde(rename = "not yet updated")]
    NotYetMarked,
}

impl From<Option<AttendanceStatus>> for MyStatus {
    fn from(status: Option<AttendanceStatus>) -> Self {
        match status {
            Some(AttendanceStatus::Present) => MyStatus::Present,
            Some(AttendanceStatus::Absent) => MyStatus::Absent,
            None => MyStatus::NotYetMarked,
        }
    }
}

/// Aggregate counts over the marks of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub present: usize,
    pub absent: usize,
    pub total: usize,
}

impl Summary {
    /// Tallies a set of statuses. `absent` is derived as `total - present`.
    pub fn tally<'a, I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = &'a AttendanceStatus>,
    {
        let mut total = 0;
        let mut present = 0;
        for status in statuses {
            total += 1;
            if *status == AttendanceStatus::Present {
                present += 1;
            }
        }
        Self {
            present,
            absent: total - present,
            total,
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound events (client → server)
// ---------------------------------------------------------------------------

const MARK_EVENT: &str = "ATTENDANCE_MARKED";
const SUMMARY_EVENT: &str = "TODAY_SUMMARY";
const MY_STATUS_EVENT: &str = "MY_ATTENDANCE";
const FINALIZE_EVENT: &str = "DONE";

const INBOUND_EVENTS: &[&str] = &[MARK_EVENT, SUMMARY_EVENT, MY_STATUS_EVENT, FINALIZE_EVENT];

/// Payload of an inbound `ATTENDANCE_MARKED`.
///
/// Decoding never fails. A missing, `null` or non-object payload decodes
/// to the default request, and a field that is not a string decodes to
/// `None`. The hub checks role and session first and only then asks
/// [`validate`](Self::validate) whether the mark is usable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MarkRequest {
    #[serde(rename = "studentId")]
    pub student_id: Option<String>,
    pub status: Option<String>,
}

impl MarkRequest {
    pub fn new(student_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            student_id: Some(student_id.into()),
            status: Some(status.into()),
        }
    }

    /// Returns the mark this request describes, or `None` if the student
    /// id is missing/empty or the status is not `present`/`absent`.
    pub fn validate(&self) -> Option<(ParticipantId, AttendanceStatus)> {
        let student_id = self.student_id.as_deref().filter(|s| !s.is_empty())?;
        let status = self.status.as_deref()?.parse().ok()?;
        Some((ParticipantId::new(student_id), status))
    }
}

impl<'de> Deserialize<'de> for MarkRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let Some(RawPayload::Object(mut fields)) = Option::<RawPayload>::deserialize(deserializer)?
        else {
            return Ok(Self::default());
        };
        Ok(Self {
            student_id: fields.remove("studentId").and_then(LooseValue::into_text),
            status: fields.remove("status").and_then(LooseValue::into_text),
        })
    }
}

/// Any payload value. Only strings are kept.
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseValue {
    Text(String),
    Other(IgnoredAny),
}

impl LooseValue {
    fn into_text(self) -> Option<String> {
        match self {
            LooseValue::Text(text) => Some(text),
            LooseValue::Other(_) => None,
        }
    }
}

/// A `data` value: an object, or anything else (ignored).
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPayload {
    Object(HashMap<String, LooseValue>),
    Other(IgnoredAny),
}

/// `{"event": ..., "data": ...}` with the payload read leniently.
#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: MarkRequest,
}

/// Every event a client may send. Unknown event names fail to decode.
///
/// Adjacently tagged: `{"event": "TODAY_SUMMARY"}` or
/// `{"event": "ATTENDANCE_MARKED", "data": {...}}`. Only the event name
/// can make a frame undecodable; `data` is ignored by the payloadless
/// events and never rejected by `Mark`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum InboundEvent {
    /// Teacher records one participant's status.
    #[serde(rename = "ATTENDANCE_MARKED")]
    Mark(MarkRequest),

    /// Teacher asks for the aggregate to be broadcast.
    #[serde(rename = "TODAY_SUMMARY")]
    Summary,

    /// Student asks for their own status.
    #[serde(rename = "MY_ATTENDANCE")]
    MyStatus,

    /// Teacher commits the session.
    #[serde(rename = "DONE")]
    Finalize,
}

impl InboundEvent {
    /// The wire name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::Mark(_) => MARK_EVENT,
            InboundEvent::Summary => SUMMARY_EVENT,
            InboundEvent::MyStatus => MY_STATUS_EVENT,
            InboundEvent::Finalize => FINALIZE_EVENT,
        }
    }
}

impl<'de> Deserialize<'de> for InboundEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let Envelope { event, data } = Envelope::deserialize(deserializer)?;
        match event.as_str() {
            MARK_EVENT => Ok(InboundEvent::Mark(data)),
            SUMMARY_EVENT => Ok(InboundEvent::Summary),
            MY_STATUS_EVENT => Ok(InboundEvent::MyStatus),
            FINALIZE_EVENT => Ok(InboundEvent::Finalize),
            other => Err(de::Error::unknown_variant(other, INBOUND_EVENTS)),
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound events (server → client)
// ---------------------------------------------------------------------------

/// Message carried by the terminal `DONE` broadcast.
pub const FINALIZED_MESSAGE: &str = "Attendance persisted";

/// Every event the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundEvent {
    /// Broadcast after a successful mark.
    AttendanceMarked {
        #[serde(rename = "studentId")]
        student_id: ParticipantId,
        status: AttendanceStatus,
    },

    /// Broadcast aggregate.
    TodaySummary(Summary),

    /// Unicast answer to a student's status request.
    MyAttendance { status: MyStatus },

    /// Broadcast once the session has been persisted and cleared.
    Done {
        message: String,
        present: usize,
        absent: usize,
        total: usize,
    },

    /// Unicast failure report.
    Error { message: String },
}

impl OutboundEvent {
    pub fn done(summary: Summary) -> Self {
        OutboundEvent::Done {
            message: FINALIZED_MESSAGE.to_string(),
            present: summary.present,
            absent: summary.absent,
            total: summary.total,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        OutboundEvent::Error {
            message: message.into(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
