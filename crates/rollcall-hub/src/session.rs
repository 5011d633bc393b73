//! The in-memory attendance session.
//!
//! At most one of these exists at a time; the hub actor holds it as an
//! `Option`. It is created by a start request, mutated by marks, and
//! dropped only by a successful finalize.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rollcall_protocol::{AttendanceStatus, ClassId, ParticipantId, Summary};
use serde::{Deserialize, Serialize};

use crate::FinalizedRecord;

/// Metadata about the active session, returned by start and by queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub class_id: ClassId,
    pub started_at: DateTime<Utc>,
    /// Number of participants marked so far.
    pub marked: usize,
}

/// Marks collected for one class since the session started.
#[derive(Debug, Clone)]
pub struct AttendanceSession {
    class_id: ClassId,
    started_at: DateTime<Utc>,
    marks: HashMap<ParticipantId, AttendanceStatus>,
}

impl AttendanceSession {
    pub fn new(class_id: ClassId) -> Self {
        Self {
            class_id,
            started_at: Utc::now(),
            marks: HashMap::new(),
        }
    }

    pub fn class_id(&self) -> &ClassId {
        &self.class_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn marks(&self) -> &HashMap<ParticipantId, AttendanceStatus> {
        &self.marks
    }

    /// Records a status. Last write wins; returns the previous status.
    pub fn mark(
        &mut self,
        participant: ParticipantId,
        status: AttendanceStatus,
    ) -> Option<AttendanceStatus> {
        self.marks.insert(participant, status)
    }

    pub fn status_of(&self, participant: &ParticipantId) -> Option<AttendanceStatus> {
        self.marks.get(participant).copied()
    }

    /// Counts over the current marks, recomputed on every call.
    pub fn summary(&self) -> Summary {
        Summary::tally(self.marks.values())
    }

    /// A copy of the marks where every roster participant without a mark
    /// is `Absent`. Marks for participants outside the roster are kept.
    /// The session itself is not modified.
    pub fn completed_with(
        &self,
        roster: &[ParticipantId],
    ) -> HashMap<ParticipantId, AttendanceStatus> {
        let mut completed = self.marks.clone();
        for participant in roster {
            completed
                .entry(participant.clone())
                .or_insert(AttendanceStatus::Absent);
        }
        completed
    }

    /// One durable record per entry of `marks`, for this session's class.
    pub fn records(
        &self,
        marks: &HashMap<ParticipantId, AttendanceStatus>,
    ) -> Vec<FinalizedRecord> {
        marks
            .iter()
            .map(|(participant, status)| FinalizedRecord {
                class_id: self.class_id.clone(),
                participant_id: participant.clone(),
                status: *status,
            })
            .collect()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            class_id: self.class_id.clone(),
            started_at: self.started_at,
            marked: self.marks.len(),
        }
    }
}
