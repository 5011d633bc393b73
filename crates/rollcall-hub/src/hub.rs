//! Hub actor: the one Tokio task that owns the attendance session and the
//! connection registry.
//!
//! Every request from the outside world is a `HubCommand` on a single
//! bounded channel. The actor handles commands one at a time and to
//! completion, including the store calls made during finalize, so no two
//! operations ever observe each other half-done.

use std::time::Duration;

use rollcall_protocol::{
    ClassId, Identity, InboundEvent, MarkRequest, MyStatus, OutboundEvent,
    ParticipantId, Role, Summary,
};
use rollcall_session::{ConnectionRegistry, ObserverSender};
use rollcall_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};

use crate::{
    AttendanceSession, AttendanceStore, FinalizedRecord, HubConfig, HubError,
    RosterStore, SessionInfo, StoreError,
};

/// Commands sent to the hub actor through its channel.
pub(crate) enum HubCommand {
    /// Register an authenticated connection.
    Connect {
        conn_id: ConnectionId,
        identity: Identity,
        sender: ObserverSender,
        reply: oneshot::Sender<Result<(), HubError>>,
    },

    /// Forget a connection. No reply; the caller is usually a drop guard.
    Disconnect { conn_id: ConnectionId },

    /// Open a session for a class.
    Start {
        class_id: ClassId,
        reply: oneshot::Sender<Result<SessionInfo, HubError>>,
    },

    /// An event decoded from a connection.
    Event {
        conn_id: ConnectionId,
        event: InboundEvent,
        reply: oneshot::Sender<Result<(), HubError>>,
    },

    Info {
        reply: oneshot::Sender<Option<SessionInfo>>,
    },

    ConnectionCount {
        reply: oneshot::Sender<usize>,
    },

    Shutdown,
}

/// Handle to the running hub actor.
///
/// Cheap to clone; every connection task holds one.
#[derive(Debug, Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Sends a command built around a fresh reply channel and waits for
    /// the answer.
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> HubCommand,
    ) -> Result<T, HubError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| HubError::Unavailable)?;
        reply_rx.await.map_err(|_| HubError::Unavailable)
    }

    /// Registers a connection so it receives broadcasts. The identity is
    /// fixed for the life of the connection.
    pub async fn connect(
        &self,
        conn_id: ConnectionId,
        identity: Identity,
        sender: ObserverSender,
    ) -> Result<(), HubError> {
        self.request(|reply| HubCommand::Connect {
            conn_id,
            identity,
            sender,
            reply,
        })
        .await?
    }

    /// Removes a connection. The session is unaffected.
    pub async fn disconnect(&self, conn_id: ConnectionId) -> Result<(), HubError> {
        self.sender
            .send(HubCommand::Disconnect { conn_id })
            .await
            .map_err(|_| HubError::Unavailable)
    }

    /// Opens a session for `class_id`.
    ///
    /// # Errors
    /// [`HubError::SessionAlreadyActive`] if one is already running; the
    /// running session is left as it is.
    pub async fn start_session(
        &self,
        class_id: ClassId,
    ) -> Result<SessionInfo, HubError> {
        self.request(|reply| HubCommand::Start { class_id, reply })
            .await?
    }

    /// Hands an inbound event to the hub and waits until it has been fully
    /// processed, broadcasts included.
    ///
    /// On an event-level failure the caller has already been sent an
    /// `ERROR` event by the time this returns.
    pub async fn dispatch(
        &self,
        conn_id: ConnectionId,
        event: InboundEvent,
    ) -> Result<(), HubError> {
        self.request(|reply| HubCommand::Event {
            conn_id,
            event,
            reply,
        })
        .await?
    }

    /// Snapshot of the active session, if any.
    pub async fn session_info(&self) -> Result<Option<SessionInfo>, HubError> {
        self.request(|reply| HubCommand::Info { reply }).await
    }

    pub async fn connection_count(&self) -> Result<usize, HubError> {
        self.request(|reply| HubCommand::ConnectionCount { reply })
            .await
    }

    /// Stops the actor. Pending commands behind this one are dropped and
    /// their callers see [`HubError::Unavailable`].
    pub async fn shutdown(&self) -> Result<(), HubError> {
        self.sender
            .send(HubCommand::Shutdown)
            .await
            .map_err(|_| HubError::Unavailable)
    }
}

/// The actor state. Runs inside a Tokio task.
struct HubActor<R, S> {
    session: Option<AttendanceSession>,
    registry: ConnectionRegistry,
    roster: R,
    store: S,
    config: HubConfig,
    receiver: mpsc::Receiver<HubCommand>,
}

impl<R: RosterStore, S: AttendanceStore> HubActor<R, S> {
    async fn run(mut self) {
        tracing::info!("hub actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                HubCommand::Connect {
                    conn_id,
                    identity,
                    sender,
                    reply,
                } => {
                    let role = identity.role;
                    let result = self
                        .registry
                        .register(conn_id, identity, sender)
                        .map_err(HubError::from);
                    if result.is_ok() {
                        tracing::debug!(
                            %conn_id,
                            %role,
                            teachers = self.registry.count_by_role(Role::Teacher),
                            students = self.registry.count_by_role(Role::Student),
                            "observer registered"
                        );
                    }
                    let _ = reply.send(result);
                }
                HubCommand::Disconnect { conn_id } => {
                    self.registry.unregister(conn_id);
                }
                HubCommand::Start { class_id, reply } => {
                    let _ = reply.send(self.handle_start(class_id));
                }
                HubCommand::Event {
                    conn_id,
                    event,
                    reply,
                } => {
                    let result = self.handle_event(conn_id, event).await;
                    let _ = reply.send(result);
                }
                HubCommand::Info { reply } => {
                    let _ = reply
                        .send(self.session.as_ref().map(AttendanceSession::info));
                }
                HubCommand::ConnectionCount { reply } => {
                    let _ = reply.send(self.registry.len());
                }
                HubCommand::Shutdown => {
                    tracing::info!("hub shutting down");
                    break;
                }
            }
        }

        tracing::info!("hub actor stopped");
    }

    fn handle_start(&mut self, class_id: ClassId) -> Result<SessionInfo, HubError> {
        if let Some(active) = &self.session {
            return Err(HubError::SessionAlreadyActive(active.class_id().clone()));
        }

        let session = AttendanceSession::new(class_id);
        let info = session.info();
        tracing::info!(class_id = %info.class_id, "attendance session started");
        self.session = Some(session);
        Ok(info)
    }

    async fn handle_event(
        &mut self,
        conn_id: ConnectionId,
        event: InboundEvent,
    ) -> Result<(), HubError> {
        let identity = self
            .registry
            .identity(&conn_id)
            .cloned()
            .ok_or(HubError::UnknownConnection(conn_id))?;

        let result = match event {
            InboundEvent::Mark(request) => self.handle_mark(&identity, &request),
            InboundEvent::Summary => self.handle_summary(&identity),
            InboundEvent::MyStatus => self.handle_my_status(conn_id, &identity),
            InboundEvent::Finalize => self.handle_finalize(&identity).await,
        };

        if let Err(e) = &result {
            tracing::debug!(%conn_id, error = %e, "event rejected");
            self.registry
                .send_to(&conn_id, OutboundEvent::error(e.to_string()));
        }
        result
    }

    fn handle_mark(
        &mut self,
        identity: &Identity,
        request: &MarkRequest,
    ) -> Result<(), HubError> {
        require_role(identity, Role::Teacher)?;
        let session = self.session.as_mut().ok_or(HubError::NoActiveSession)?;

        let Some((participant, status)) = request.validate() else {
            tracing::debug!(
                teacher = %identity.participant_id,
                ?request,
                "malformed mark ignored"
            );
            return Ok(());
        };

        session.mark(participant.clone(), status);
        let summary = session.summary();
        tracing::debug!(%participant, %status, "attendance marked");

        // Mark then summary, back to back, so every connection sees them
        // in that order.
        self.registry.broadcast(&OutboundEvent::AttendanceMarked {
            student_id: participant,
            status,
        });
        self.registry.broadcast(&OutboundEvent::TodaySummary(summary));
        Ok(())
    }

    fn handle_summary(&self, identity: &Identity) -> Result<(), HubError> {
        require_role(identity, Role::Teacher)?;
        let session = self.session.as_ref().ok_or(HubError::NoActiveSession)?;
        self.registry
            .broadcast(&OutboundEvent::TodaySummary(session.summary()));
        Ok(())
    }

    fn handle_my_status(
        &self,
        conn_id: ConnectionId,
        identity: &Identity,
    ) -> Result<(), HubError> {
        require_role(identity, Role::Student)?;
        let session = self.session.as_ref().ok_or(HubError::NoActiveSession)?;
        let status = MyStatus::from(session.status_of(&identity.participant_id));
        self.registry
            .send_to(&conn_id, OutboundEvent::MyAttendance { status });
        Ok(())
    }

    /// Default-fills, persists and clears the session. Any failure leaves
    /// the session exactly as it was.
    async fn handle_finalize(&mut self, identity: &Identity) -> Result<(), HubError> {
        require_role(identity, Role::Teacher)?;
        let session = self.session.as_ref().ok_or(HubError::NoActiveSession)?;
        let class_id = session.class_id().clone();
        let limit = self.config.store_timeout;

        let roster = fetch_roster(&self.roster, &class_id, limit)
            .await
            .inspect_err(|e| tracing::warn!(%class_id, error = %e, "finalize aborted"))?;

        let completed = session.completed_with(&roster);
        let summary = Summary::tally(completed.values());
        let records = session.records(&completed);

        if records.is_empty() {
            tracing::debug!(%class_id, "nothing to persist");
        } else {
            persist(&self.store, records, limit)
                .await
                .inspect_err(|e| tracing::warn!(%class_id, error = %e, "finalize aborted"))?;
        }

        self.session = None;
        tracing::info!(
            %class_id,
            present = summary.present,
            absent = summary.absent,
            total = summary.total,
            "attendance session finalized"
        );
        self.registry.broadcast(&OutboundEvent::done(summary));
        Ok(())
    }
}

fn require_role(identity: &Identity, role: Role) -> Result<(), HubError> {
    if identity.role == role {
        Ok(())
    } else {
        Err(HubError::Forbidden(role))
    }
}

async fn fetch_roster<R: RosterStore>(
    roster: &R,
    class_id: &ClassId,
    limit: Duration,
) -> Result<Vec<ParticipantId>, HubError> {
    match tokio::time::timeout(limit, roster.list_participants(class_id)).await {
        Ok(Ok(participants)) => Ok(participants),
        Ok(Err(StoreError::ClassNotFound(class_id))) => {
            Err(HubError::ClassNotFound(class_id))
        }
        Ok(Err(StoreError::Backend(reason))) => Err(HubError::RosterUnavailable(reason)),
        Err(_) => Err(HubError::RosterUnavailable(format!(
            "timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

async fn persist<S: AttendanceStore>(
    store: &S,
    records: Vec<FinalizedRecord>,
    limit: Duration,
) -> Result<(), HubError> {
    match tokio::time::timeout(limit, store.bulk_insert(records)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(HubError::PersistenceFailure(e.to_string())),
        Err(_) => Err(HubError::PersistenceFailure(format!(
            "timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

/// Spawns the hub actor and returns a handle to it.
///
/// `config.command_buffer` bounds the command channel; callers wait when
/// it is full.
pub fn spawn_hub<R: RosterStore, S: AttendanceStore>(
    config: HubConfig,
    roster: R,
    store: S,
) -> HubHandle {
    let (tx, rx) = mpsc::channel(config.command_buffer);

    let actor = HubActor {
        session: None,
        registry: ConnectionRegistry::new(),
        roster,
        store,
        config,
        receiver: rx,
    };

    tokio::spawn(actor.run());

    HubHandle { sender: tx }
}
