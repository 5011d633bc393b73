//! `RollcallServer` builder and server loop.
//!
//! This is the entry point for running a Rollcall server. It ties
//! together all the layers: transport → protocol → session → hub.

use std::sync::Arc;
use std::time::Duration;

use rollcall_hub::{AttendanceStore, HubConfig, HubHandle, RosterStore, spawn_hub};
use rollcall_protocol::{Codec, JsonCodec};
use rollcall_session::Authenticator;
use rollcall_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::config::DEFAULT_HANDSHAKE_TIMEOUT;
use crate::{RollcallError, ServerConfig};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<A: Authenticator, C: Codec> {
    pub(crate) hub: HubHandle,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) idle_timeout: Option<Duration>,
    pub(crate) handshake_timeout: Duration,
}

/// Builder for configuring and starting a Rollcall server.
///
/// # Example
///
/// ```rust,no_run
/// use rollcall::prelude::*;
///
/// # async fn run() -> Result<(), RollcallError> {
/// let directory = MemoryDirectory::new();
/// let auth = JwtAuthenticator::new(b"secret", directory);
/// let server = RollcallServer::<JwtAuthenticator<MemoryDirectory>, JsonCodec>::builder()
///     .bind("0.0.0.0:8080")
///     .build(auth, MemoryRoster::new(), MemoryAttendanceStore::new())
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct RollcallServerBuilder {
    bind_addr: String,
    hub_config: HubConfig,
    idle_timeout: Option<Duration>,
    handshake_timeout: Duration,
}

impl RollcallServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            hub_config: HubConfig::default(),
            idle_timeout: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Starts from a loaded [`ServerConfig`].
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new()
            .bind(&config.bind_addr)
            .hub_config(config.hub_config())
            .idle_timeout(config.idle_timeout)
            .handshake_timeout(config.handshake_timeout)
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn hub_config(mut self, config: HubConfig) -> Self {
        self.hub_config = config;
        self
    }

    /// Closes connections that send nothing for `timeout`. `None`
    /// disables the check.
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Drops peers that have not completed the WebSocket upgrade within
    /// `timeout` of being accepted.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Binds the listener and spawns the hub.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<A, R, S>(
        self,
        auth: A,
        roster: R,
        store: S,
    ) -> Result<RollcallServer<A, JsonCodec>, RollcallError>
    where
        A: Authenticator,
        R: RosterStore,
        S: AttendanceStore,
    {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let hub = spawn_hub(self.hub_config, roster, store);

        let state = Arc::new(ServerState {
            hub,
            auth,
            codec: JsonCodec,
            idle_timeout: self.idle_timeout,
            handshake_timeout: self.handshake_timeout,
        });

        Ok(RollcallServer { transport, state })
    }
}

impl Default for RollcallServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A Rollcall server bound to its address.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct RollcallServer<A: Authenticator, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, C>>,
}

impl<A, C> RollcallServer<A, C>
where
    A: Authenticator,
    C: Codec,
{
    /// Creates a new builder.
    pub fn builder() -> RollcallServerBuilder {
        RollcallServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Handle to the hub, for starting sessions and queries.
    pub fn hub(&self) -> HubHandle {
        self.state.hub.clone()
    }

    /// Runs the server accept loop.
    ///
    /// Spawns a handler task for each accepted peer; the WebSocket upgrade
    /// runs inside that task. Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), RollcallError> {
        tracing::info!(addr = ?self.local_addr().ok(), "rollcall server running");

        loop {
            match self.transport.accept().await {
                Ok(pending) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(pending, state).await {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
