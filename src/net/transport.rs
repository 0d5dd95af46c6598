//! WebSocket server
//!
//! One tokio task per connection. Each connection splits its socket: the read
//! half feeds [`ServerContext::dispatch`] in arrival order, the write half is
//! owned by a writer task draining the session's outbound channel.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::net::dispatch::ServerContext;
use crate::net::session::{ConnectionId, SessionId, DEFAULT_OUTBOUND_QUEUE_SIZE};

/// Per-connection buffer limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    pub max_message_size: usize,
    pub outbound_queue_size: usize,
}

impl ConnectionLimits {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            max_message_size: config.max_message_size,
            outbound_queue_size: config.outbound_queue_size,
        }
    }
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_message_size: 65536,
            outbound_queue_size: DEFAULT_OUTBOUND_QUEUE_SIZE,
        }
    }
}

/// Accepts WebSocket connections and runs one session per connection
pub struct ArenaServer {
    config: ServerConfig,
    context: Arc<ServerContext>,
}

impl ArenaServer {
    pub fn new(config: ServerConfig, context: Arc<ServerContext>) -> Self {
        Self { config, context }
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.config.bind_address, self.config.port)
    }

    /// Bind the listening socket and serve until the task is dropped.
    /// Failing to bind is the only fatal error.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.bind_addr();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!(
            "WebSocket server listening on ws://{} ({} protocol)",
            addr,
            self.context.registry().variant()
        );

        self.serve(listener).await
    }

    /// Accept loop over an already bound listener
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let limits = ConnectionLimits::from_config(&self.config);

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
            }

            let connection_id = self.next_connection_id();
            let context = self.context.clone();

            tokio::spawn(async move {
                debug!("New connection from {} (conn_id: {})", peer, connection_id);
                if let Err(e) =
                    accept_connection(stream, connection_id, context, limits).await
                {
                    warn!("Connection error from {}: {:#}", peer, e);
                }
            });
        }
    }

    /// Random connection id not used by any live session
    fn next_connection_id(&self) -> ConnectionId {
        loop {
            let candidate = rand::random::<ConnectionId>();
            if self.context.sessions.lookup_by_connection(candidate).is_none() {
                break candidate;
            }
        }
    }
}

/// Size limits applied to every accepted socket
pub fn websocket_config(max_message_size: usize) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(max_message_size);
    config.max_frame_size = Some(max_message_size);
    config
}

/// Perform the server handshake on a raw stream, then run the session
pub async fn accept_connection<S>(
    stream: S,
    connection_id: ConnectionId,
    context: Arc<ServerContext>,
    limits: ConnectionLimits,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let websocket = tokio_tungstenite::accept_async_with_config(
        stream,
        Some(websocket_config(limits.max_message_size)),
    )
    .await
    .context("WebSocket handshake failed")?;

    serve_websocket(websocket, connection_id, context, limits.outbound_queue_size).await;
    Ok(())
}

/// Unregisters the session however the connection task ends
struct SessionGuard {
    context: Arc<ServerContext>,
    session_id: SessionId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.context.close_session(self.session_id);
    }
}

/// Run one session over an established WebSocket until either side closes it
pub async fn serve_websocket<S>(
    websocket: WebSocketStream<S>,
    connection_id: ConnectionId,
    context: Arc<ServerContext>,
    outbound_queue_size: usize,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = websocket.split();
    let (outbound, mut outbound_rx) = mpsc::channel::<Vec<u8>>(outbound_queue_size.max(1));

    let session = context.open_session(connection_id, outbound);
    let session_id = session.id();
    let guard = SessionGuard {
        context: context.clone(),
        session_id,
    };
    info!("Session {} connected (conn_id: {})", session_id, connection_id);

    let metrics = context.metrics.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let len = frame.len();
            if let Err(e) = sink.send(Message::Binary(frame)).await {
                debug!("Write to session {} failed: {}", session_id, e);
                break;
            }
            metrics.record_sent(len);
        }
        let _ = sink.close().await;
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Binary(frame)) => {
                context.dispatch(&session, &frame);
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(_)) => {
                debug!("Ignoring text message from session {}", session_id);
            }
            // Ping/pong are answered by tungstenite itself
            Ok(_) => {}
            Err(e) => {
                debug!("Read from session {} failed: {}", session_id, e);
                break;
            }
        }
    }

    // Dropping the last senders lets the writer drain and close the sink
    drop(guard);
    drop(session);
    if let Err(e) = writer.await {
        warn!("Writer task for session {} panicked: {}", session_id, e);
    }
}
