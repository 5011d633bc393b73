//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::{self, Message};

use crate::{Connection, ConnectionId, PendingConnection, Transport, TransportError};

/// Process-wide source of connection ids. Starts at 1.
static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a listener. Port `0` picks a free port; see
    /// [`local_addr`](Self::local_addr).
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| {
            TransportError::Bind {
                addr: addr.to_string(),
                source,
            }
        })?;
        tracing::info!(addr, "websocket listener bound");
        Ok(Self { listener })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Pending = PendingWebSocket;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Pending, Self::Error> {
        let (tcp, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        tracing::trace!(%peer, "tcp peer accepted");
        Ok(PendingWebSocket { tcp, peer })
    }
}

/// A TCP peer that has not finished its WebSocket upgrade yet.
pub struct PendingWebSocket {
    tcp: TcpStream,
    peer: SocketAddr,
}

impl PendingWebSocket {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl PendingConnection for PendingWebSocket {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn upgrade(self) -> Result<Self::Connection, Self::Error> {
        let peer = self.peer;

        // The credential travels in the upgrade request's query string,
        // so it has to be captured during the handshake callback.
        let mut query: Option<String> = None;
        let capture_query =
            |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                query = req.uri().query().map(str::to_owned);
                Ok(resp)
            };
        let ws = tokio_tungstenite::accept_hdr_async(self.tcp, capture_query)
            .await
            .map_err(|e| TransportError::Upgrade(e.to_string()))?;

        let conn_id = ConnectionId::new(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%conn_id, %peer, has_query = query.is_some(), "websocket upgraded");

        let (sink, frames) = ws.split();
        Ok(WebSocketConnection {
            id: conn_id,
            query,
            sink: Mutex::new(sink),
            frames: Mutex::new(frames),
        })
    }
}

/// A single WebSocket connection.
///
/// The socket is split so a writer task can send while a reader task
/// is parked in `recv`.
pub struct WebSocketConnection {
    id: ConnectionId,
    query: Option<String>,
    sink: Mutex<SplitSink<WsStream, Message>>,
    frames: Mutex<SplitStream<WsStream>>,
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        // JSON goes out as text frames; browser clients expect strings.
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::text(text.to_owned()),
            Err(_) => Message::Binary(data.to_vec().into()),
        };
        self.sink.lock().await.send(msg).await.map_err(send_error)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut frames = self.frames.lock().await;
        while let Some(frame) = frames.next().await {
            match frame.map_err(|e| TransportError::Receive(e.to_string()))? {
                Message::Text(text) => return Ok(Some(text.as_bytes().to_vec())),
                Message::Binary(data) => return Ok(Some(data.to_vec())),
                Message::Close(_) => return Ok(None),
                // Pings are answered by tungstenite itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink.lock().await.close().await.map_err(send_error)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn query_param(&self, key: &str) -> Option<String> {
        self.query
            .as_deref()
            .and_then(|q| crate::parse_query_param(q, key))
    }
}

fn send_error(e: tungstenite::Error) -> TransportError {
    match e {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::ConnectionClosed(e.to_string())
        }
        other => TransportError::Send(other.to_string()),
    }
}
