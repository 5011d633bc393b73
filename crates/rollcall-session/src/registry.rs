//! The connection registry: every authenticated observer and its outbound
//! channel.
//!
//! # Concurrency note
//!
//! `ConnectionRegistry` is a plain `HashMap` wrapper and is not
//! thread-safe by itself. It is owned by the hub actor, which is the only
//! task that ever touches it, so registration, removal and fan-out are
//! serialized with every session mutation.

use std::collections::HashMap;

use rollcall_protocol::{Identity, OutboundEvent, Role};
use rollcall_transport::ConnectionId;
use tokio::sync::mpsc;

use crate::SessionError;

/// Channel that carries outbound events to one connection's writer task.
///
/// Unbounded so the hub never waits on a slow client; a single channel per
/// connection keeps that connection's events in order.
pub type ObserverSender = mpsc::UnboundedSender<OutboundEvent>;

/// One registered connection.
#[derive(Debug)]
pub struct Observer {
    identity: Identity,
    sender: ObserverSender,
}

impl Observer {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Whether the connection's writer has gone away.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Queues an event. Returns `false` if the writer is gone.
    fn deliver(&self, event: OutboundEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// Tracks all connected, authenticated observers.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    observers: HashMap<ConnectionId, Observer>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection. Its identity is fixed from here on.
    ///
    /// # Errors
    /// [`SessionError::DuplicateConnection`] if the id is already present.
    pub fn register(
        &mut self,
        conn_id: ConnectionId,
        identity: Identity,
        sender: ObserverSender,
    ) -> Result<(), SessionError> {
        if self.observers.contains_key(&conn_id) {
            return Err(SessionError::DuplicateConnection(conn_id));
        }
        tracing::info!(
            %conn_id,
            participant = %identity.participant_id,
            role = %identity.role,
            "observer registered"
        );
        self.observers.insert(conn_id, Observer { identity, sender });
        Ok(())
    }

    /// Removes a connection, dropping its sender so the writer task ends.
    pub fn unregister(&mut self, conn_id: ConnectionId) -> Option<Identity> {
        let observer = self.observers.remove(&conn_id)?;
        tracing::info!(
            %conn_id,
            participant = %observer.identity.participant_id,
            "observer unregistered"
        );
        Some(observer.identity)
    }

    pub fn get(&self, conn_id: &ConnectionId) -> Option<&Observer> {
        self.observers.get(conn_id)
    }

    /// The identity bound to a connection at handshake.
    pub fn identity(&self, conn_id: &ConnectionId) -> Option<&Identity> {
        self.observers.get(conn_id).map(Observer::identity)
    }

    /// Unicast. Returns `false` if the connection is unknown or closed.
    pub fn send_to(&self, conn_id: &ConnectionId, event: OutboundEvent) -> bool {
        match self.observers.get(conn_id) {
            Some(observer) => observer.deliver(event),
            None => false,
        }
    }

    /// Fans an event out to every open connection. Closed or closing
    /// connections are skipped. Returns how many connections accepted it.
    pub fn broadcast(&self, event: &OutboundEvent) -> usize {
        self.observers
            .values()
            .filter(|observer| !observer.is_closed())
            .filter(|observer| observer.deliver(event.clone()))
            .count()
    }

    pub fn count_by_role(&self, role: Role) -> usize {
        self.observers
            .values()
            .filter(|observer| observer.identity.role == role)
            .count()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}
