//! Durable collaborators consulted when a session is finalized.
//!
//! The hub never reads these during marking. At finalize it asks the
//! [`RosterStore`] who belongs to the class, then hands every completed
//! record to the [`AttendanceStore`] in one bulk write.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use rollcall_protocol::{AttendanceStatus, ClassId, ParticipantId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Errors reported by store backends.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("class {0} not found")]
    ClassNotFound(ClassId),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// One participant's final status for a finalized session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedRecord {
    pub class_id: ClassId,
    pub participant_id: ParticipantId,
    pub status: AttendanceStatus,
}

/// Lists the participants enrolled in a class.
pub trait RosterStore: Send + Sync + 'static {
    /// # Errors
    /// [`StoreError::ClassNotFound`] for an unknown class;
    /// [`StoreError::Backend`] if the roster cannot be read.
    fn list_participants(
        &self,
        class_id: &ClassId,
    ) -> impl Future<Output = Result<Vec<ParticipantId>, StoreError>> + Send;
}

/// Persists finalized attendance.
pub trait AttendanceStore: Send + Sync + 'static {
    /// Writes all records or none of them.
    fn bulk_insert(
        &self,
        records: Vec<FinalizedRecord>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// In-process roster. Cloning shares the same table.
#[derive(Debug, Clone, Default)]
pub struct MemoryRoster {
    classes: Arc<RwLock<HashMap<ClassId, Vec<ParticipantId>>>>,
}

impl MemoryRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a class with the given participants.
    pub async fn insert_class(
        &self,
        class_id: ClassId,
        participants: impl IntoIterator<Item = ParticipantId>,
    ) {
        self.classes
            .write()
            .await
            .insert(class_id, participants.into_iter().collect());
    }

    /// Enrolls one participant, creating the class if needed.
    pub async fn add_participant(
        &self,
        class_id: ClassId,
        participant_id: ParticipantId,
    ) {
        let mut classes = self.classes.write().await;
        let roster = classes.entry(class_id).or_default();
        if !roster.contains(&participant_id) {
            roster.push(participant_id);
        }
    }
}

impl RosterStore for MemoryRoster {
    async fn list_participants(
        &self,
        class_id: &ClassId,
    ) -> Result<Vec<ParticipantId>, StoreError> {
        self.classes
            .read()
            .await
            .get(class_id)
            .cloned()
            .ok_or_else(|| StoreError::ClassNotFound(class_id.clone()))
    }
}

/// In-process attendance log. Cloning shares the same log.
#[derive(Debug, Clone, Default)]
pub struct MemoryAttendanceStore {
    records: Arc<RwLock<Vec<FinalizedRecord>>>,
}

impl MemoryAttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record written so far, in write order.
    pub async fn records(&self) -> Vec<FinalizedRecord> {
        self.records.read().await.clone()
    }

    pub async fn for_class(&self, class_id: &ClassId) -> Vec<FinalizedRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| &r.class_id == class_id)
            .cloned()
            .collect()
    }

    /// Latest persisted status for a participant in a class.
    pub async fn status_of(
        &self,
        class_id: &ClassId,
        participant_id: &ParticipantId,
    ) -> Option<AttendanceStatus> {
        self.records
            .read()
            .await
            .iter()
            .rev()
            .find(|r| &r.class_id == class_id && &r.participant_id == participant_id)
            .map(|r| r.status)
    }
}

impl AttendanceStore for MemoryAttendanceStore {
    async fn bulk_insert(&self, records: Vec<FinalizedRecord>) -> Result<(), StoreError> {
        tracing::debug!(count = records.len(), "writing attendance records");
        self.records.write().await.extend(records);
        Ok(())
    }
}
