//! Per-connection handler: token check, registration, and event routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   0. Finish the WebSocket upgrade, bounded by the handshake timeout
//!   1. Read `token` from the query string → authenticate → `Identity`
//!   2. Register with the hub → spawn the writer task
//!   3. Loop: receive frames → decode → dispatch to the hub

use std::sync::Arc;

use rollcall_hub::{HubError, HubHandle};
use rollcall_protocol::{Codec, Identity, InboundEvent, OutboundEvent};
use rollcall_session::Authenticator;
use rollcall_transport::{
    Connection, ConnectionId, PendingConnection, PendingWebSocket, TransportError,
    WebSocketConnection,
};
use tokio::sync::mpsc;

use crate::server::ServerState;
use crate::RollcallError;

/// Message sent to a connection whose token is missing or rejected.
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized or invalid token";

/// Query parameter carrying the access token.
const TOKEN_PARAM: &str = "token";

/// Drop guard that unregisters the connection when the handler exits.
///
/// Runs even if the handler panics. `Drop` is synchronous, so the
/// disconnect is sent from a fire-and-forget task.
struct ObserverGuard {
    conn_id: ConnectionId,
    hub: HubHandle,
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let hub = self.hub.clone();
        tokio::spawn(async move {
            let _ = hub.disconnect(conn_id).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    pending: PendingWebSocket,
    state: Arc<ServerState<A, C>>,
) -> Result<(), RollcallError>
where
    A: Authenticator,
    C: Codec,
{
    let peer = pending.peer_addr();
    let limit = state.handshake_timeout;
    let conn = tokio::time::timeout(limit, pending.upgrade())
        .await
        .map_err(|_| TransportError::HandshakeTimeout(limit))
        .and_then(|upgraded| upgraded)
        .inspect_err(|e| tracing::debug!(%peer, error = %e, "handshake failed"))?;

    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    // --- Step 1: Authenticate ---
    let identity = match authenticate(&conn, &state).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::info!(%conn_id, error = %e, "connection rejected");
            reject(&conn, &state.codec).await;
            return Err(e);
        }
    };

    tracing::info!(
        %conn_id,
        participant = %identity.participant_id,
        role = %identity.role,
        "connection authenticated"
    );

    // --- Step 2: Register and start the writer ---
    let (tx, rx) = mpsc::unbounded_channel();
    state.hub.connect(conn_id, identity, tx).await?;
    let _guard = ObserverGuard {
        conn_id,
        hub: state.hub.clone(),
    };
    let writer = tokio::spawn(write_loop(Arc::clone(&conn), Arc::clone(&state), rx));

    // --- Step 3: Event loop ---
    let result = read_loop(&conn, &state).await;

    writer.abort();
    let _ = conn.close().await;

    // _guard drops here → hub disconnect fires.
    result
}

async fn authenticate<A, C>(
    conn: &WebSocketConnection,
    state: &ServerState<A, C>,
) -> Result<Identity, RollcallError>
where
    A: Authenticator,
    C: Codec,
{
    let token = conn.query_param(TOKEN_PARAM).unwrap_or_default();
    let identity = state.auth.authenticate(&token).await?;
    Ok(identity)
}

/// Best-effort `ERROR` followed by a close. Failures are ignored: the
/// peer may already be gone.
async fn reject(conn: &WebSocketConnection, codec: &impl Codec) {
    if let Ok(bytes) = codec.encode(&OutboundEvent::error(UNAUTHORIZED_MESSAGE)) {
        let _ = conn.send(&bytes).await;
    }
    let _ = conn.close().await;
}

/// Drains the connection's outbound channel onto the socket, in order.
///
/// Ends when the hub drops the sender (unregister) or the socket fails.
async fn write_loop<A, C>(
    conn: Arc<WebSocketConnection>,
    state: Arc<ServerState<A, C>>,
    mut rx: mpsc::UnboundedReceiver<OutboundEvent>,
) where
    A: Authenticator,
    C: Codec,
{
    let conn_id = conn.id();
    while let Some(event) = rx.recv().await {
        let bytes = match state.codec.encode(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "failed to encode outbound event");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            if e.is_disconnect() {
                tracing::debug!(%conn_id, "peer gone, stopping writer");
            } else {
                tracing::warn!(%conn_id, error = %e, "send failed, stopping writer");
            }
            break;
        }
    }
}

/// Reads frames until the peer leaves, the idle timeout fires, or the hub
/// stops.
async fn read_loop<A, C>(
    conn: &WebSocketConnection,
    state: &ServerState<A, C>,
) -> Result<(), RollcallError>
where
    A: Authenticator,
    C: Codec,
{
    let conn_id = conn.id();

    loop {
        let received = match state.idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, conn.recv()).await {
                Ok(received) => received,
                Err(_) => {
                    tracing::info!(%conn_id, "connection idle, closing");
                    return Ok(());
                }
            },
            None => conn.recv().await,
        };

        let data = match received {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(%conn_id, "connection closed cleanly");
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                return Ok(());
            }
        };

        let event: InboundEvent = match state.codec.decode(&data) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "undecodable frame dropped");
                continue;
            }
        };

        tracing::debug!(%conn_id, event = event.name(), "event received");
        match state.hub.dispatch(conn_id, event).await {
            Ok(()) => {}
            Err(HubError::Unavailable) => {
                tracing::warn!(%conn_id, "hub unavailable, closing connection");
                return Err(HubError::Unavailable.into());
            }
            // The hub has already told the client.
            Err(e) if e.is_retryable() => {
                tracing::info!(%conn_id, error = %e, "finalize failed, session kept for retry");
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "event failed");
            }
        }
    }
}
