//! Shared server state and per-frame dispatch
//!
//! `ServerContext` owns the session and lobby registries and is handed to
//! every connection task behind an `Arc`.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::lobby::manager::{LobbyError, LobbyManager};
use crate::lobby::room::{Lobby, LobbyId};
use crate::metrics::Metrics;
use crate::net::codec::CodecError;
use crate::net::handlers;
use crate::net::packets::{MapData, PacketKind, WirePacket};
use crate::net::registry::{PacketRegistry, Resolved};
use crate::net::session::{
    BroadcastReport, ConnectionId, FrameSender, Session, SessionId, SessionRegistry,
};

/// What happened to one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Handled(PacketKind),
    /// Decoded fine but nothing is registered for it
    NoHandler(PacketKind),
    DecodeFailed(PacketKind, CodecError),
    /// Server-to-client kind received from a client
    Unsupported(PacketKind),
    Unknown(u8),
    EmptyFrame,
}

/// Process-wide state, built once at startup
pub struct ServerContext {
    pub sessions: SessionRegistry,
    pub lobbies: LobbyManager,
    pub metrics: Arc<Metrics>,
    registry: PacketRegistry,
}

impl ServerContext {
    pub fn new(registry: PacketRegistry, lobbies: LobbyManager, metrics: Arc<Metrics>) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            lobbies,
            metrics,
            registry,
        }
    }

    /// Build the context for a configured deployment, with its default handlers
    pub fn from_config(
        config: &ServerConfig,
        map_definition: String,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let registry = handlers::build_registry(config.protocol)?;
        let lobbies = LobbyManager::new(config.lobby_max_empty_time, map_definition);
        Ok(Self::new(registry, lobbies, metrics))
    }

    pub fn registry(&self) -> &PacketRegistry {
        &self.registry
    }

    /// Create and register the session for a freshly accepted connection
    pub fn open_session(&self, connection_id: ConnectionId, outbound: FrameSender) -> Arc<Session> {
        let session = Arc::new(Session::new(String::new(), connection_id, outbound));
        self.sessions.register(session.clone());

        self.metrics.connections_total.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .sessions_active
            .store(self.sessions.count() as u64, Ordering::Relaxed);
        session
    }

    /// Tear down a session: drop its lobby membership, then unregister it.
    /// Safe to call more than once.
    pub fn close_session(&self, session_id: SessionId) {
        if let Some(lobby_id) = self.lobbies.leave_current(session_id) {
            debug!("Session {} removed from lobby {} on disconnect", session_id, lobby_id);
        }
        if self.sessions.unregister(session_id).is_some() {
            info!("Session {} disconnected", session_id);
        }
        self.metrics
            .sessions_active
            .store(self.sessions.count() as u64, Ordering::Relaxed);
    }

    /// Decode one frame and hand it to its registered handler
    pub fn dispatch(&self, session: &Arc<Session>, frame: &[u8]) -> DispatchOutcome {
        self.metrics.record_received(frame.len());

        let packet = match self.registry.resolve(frame) {
            Ok(Resolved::Packet(packet)) => packet,
            Ok(Resolved::Unknown(tag)) => {
                self.metrics.unknown_packets.fetch_add(1, Ordering::Relaxed);
                warn!("Received unknown packet type {} from {}", tag, session.id());
                return DispatchOutcome::Unknown(tag);
            }
            Ok(Resolved::Unsupported(kind)) => {
                debug!("Ignoring {} from client {}: server-to-client only", kind, session.id());
                return DispatchOutcome::Unsupported(kind);
            }
            Err(_) => {
                self.metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Received empty frame from {}", session.id());
                return DispatchOutcome::EmptyFrame;
            }
        };

        // resolve() only yields packets for registered tags
        let Some(kind) = packet.kind() else {
            return DispatchOutcome::Unknown(packet.tag);
        };

        if let Some(error) = packet.error {
            self.metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
            warn!("Error deserializing {} from {}: {}", kind, session.id(), error);
            return DispatchOutcome::DecodeFailed(kind, error);
        }

        debug!("Received {} from {} ({} bytes)", kind, session.id(), frame.len());

        match self.registry.handler(packet.tag) {
            Some(handler) => {
                let ctx = HandlerContext {
                    session,
                    server: self,
                };
                handler(&packet, &ctx);
                DispatchOutcome::Handled(kind)
            }
            None => DispatchOutcome::NoHandler(kind),
        }
    }

    /// Join a session to a lobby and send it the lobby's map
    pub fn join_lobby(&self, session: &Session, lobby_id: LobbyId) -> Result<Lobby, LobbyError> {
        self.lobbies.join(lobby_id, session.id())?;
        let lobby = self
            .lobbies
            .find_by_id(lobby_id)
            .ok_or(LobbyError::NotFound(lobby_id))?;

        if !lobby.map_definition().is_empty() {
            let map = MapData {
                json: lobby.map_definition().to_string(),
            };
            if let Err(e) = session.send_packet(&map) {
                self.metrics.send_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to send map data to {}: {}", session.id(), e);
            }
        }
        Ok(lobby)
    }

    /// Remove lobbies that have stayed empty past the limit
    pub fn sweep_expired_lobbies(&self, now: Instant) -> Vec<LobbyId> {
        let expired = self.lobbies.sweep_expired_lobbies(now);
        self.metrics
            .lobbies_expired
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        self.metrics
            .lobbies_active
            .store(self.lobbies.lobby_count() as u64, Ordering::Relaxed);
        expired
    }
}

/// What a handler sees: the sending session and the shared server state
pub struct HandlerContext<'a> {
    pub session: &'a Arc<Session>,
    pub server: &'a ServerContext,
}

impl HandlerContext<'_> {
    /// Send a packet back over the originating connection
    pub fn reply<P: WirePacket>(&self, packet: &P) {
        if let Err(e) = self.session.send_packet(packet) {
            self.server.metrics.send_failures.fetch_add(1, Ordering::Relaxed);
            warn!("Failed to send {} to {}: {}", P::KIND, self.session.id(), e);
        }
    }

    /// Send a packet to every connected session
    pub fn broadcast<P: WirePacket>(&self, packet: &P) -> BroadcastReport {
        match packet.encode() {
            Ok(payload) => {
                let report = self.server.sessions.broadcast(P::KIND.tag(), &payload);
                self.record_failures(report)
            }
            Err(e) => {
                warn!("Failed to encode {} for broadcast: {}", P::KIND, e);
                BroadcastReport::default()
            }
        }
    }

    /// Send a packet to every member of a lobby
    pub fn send_to_lobby<P: WirePacket>(&self, lobby: &Lobby, packet: &P) -> BroadcastReport {
        match packet.encode() {
            Ok(payload) => {
                let report =
                    self.server
                        .sessions
                        .send_to(lobby.members(), P::KIND.tag(), &payload);
                self.record_failures(report)
            }
            Err(e) => {
                warn!("Failed to encode {} for lobby {}: {}", P::KIND, lobby.id(), e);
                BroadcastReport::default()
            }
        }
    }

    fn record_failures(&self, report: BroadcastReport) -> BroadcastReport {
        if report.failed > 0 {
            self.server
                .metrics
                .send_failures
                .fetch_add(report.failed as u64, Ordering::Relaxed);
        }
        report
    }
}
