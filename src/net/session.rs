use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::net::codec::{encode_frame, CodecError};
use crate::net::packets::WirePacket;

pub type SessionId = Uuid;

/// Transport-level connection id, assigned when the socket is accepted
pub type ConnectionId = u64;

/// Outbound half of a connection. Frames pushed here are written by the
/// connection's writer task, which is the only owner of the socket sink.
pub type FrameSender = mpsc::Sender<Vec<u8>>;

/// Frames a session may have queued before further sends fail
pub const DEFAULT_OUTBOUND_QUEUE_SIZE: usize = 256;

/// Errors when sending to a session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Session {0} outbound channel is closed")]
    Closed(SessionId),
    #[error("Session {0} outbound queue is full")]
    Full(SessionId),
    #[error("Encode error: {0}")]
    Codec(#[from] CodecError),
}

/// One connected client. Identity never changes after creation.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    display_name: String,
    connection_id: ConnectionId,
    outbound: FrameSender,
}

impl Session {
    pub fn new(display_name: String, connection_id: ConnectionId, outbound: FrameSender) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name,
            connection_id,
            outbound,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Queue an already framed packet without waiting.
    /// A full queue drops the frame; the session stays usable.
    pub fn send_frame(&self, frame: Vec<u8>) -> Result<(), SessionError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::Full(self.id),
            TrySendError::Closed(_) => SessionError::Closed(self.id),
        })
    }

    /// Frame and queue a raw payload
    pub fn send_raw(&self, tag: u8, payload: &[u8]) -> Result<(), SessionError> {
        self.send_frame(encode_frame(tag, payload))
    }

    /// Encode, frame and queue a packet
    pub fn send_packet<P: WirePacket>(&self, packet: &P) -> Result<(), SessionError> {
        self.send_frame(packet.to_frame()?)
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

/// Delivery counts of a broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Table of live sessions shared by every connection task
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a session. A colliding id replaces the previous entry.
    pub fn register(&self, session: Arc<Session>) {
        if let Some(previous) = self.sessions.write().insert(session.id(), session) {
            warn!("Session id {} collided, previous entry replaced", previous.id());
        }
    }

    /// Remove a session. Unknown ids are ignored.
    pub fn unregister(&self, session_id: SessionId) -> Option<Arc<Session>> {
        self.sessions.write().remove(&session_id)
    }

    pub fn get(&self, session_id: SessionId) -> Option<Arc<Session>> {
        self.sessions.read().get(&session_id).cloned()
    }

    /// Find the session owning a connection (linear scan)
    pub fn lookup_by_connection(&self, connection_id: ConnectionId) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .values()
            .find(|s| s.connection_id() == connection_id)
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Send a packet to every registered session.
    ///
    /// A failed send is logged and skipped. The session stays registered; only
    /// its own connection loop removes it.
    pub fn broadcast(&self, tag: u8, payload: &[u8]) -> BroadcastReport {
        let targets: Vec<Arc<Session>> = self.sessions.read().values().cloned().collect();
        Self::deliver(&targets, &encode_frame(tag, payload))
    }

    /// Send a packet to the given sessions; unknown ids are skipped
    pub fn send_to(&self, session_ids: &[SessionId], tag: u8, payload: &[u8]) -> BroadcastReport {
        let targets: Vec<Arc<Session>> = {
            let sessions = self.sessions.read();
            session_ids
                .iter()
                .filter_map(|id| sessions.get(id).cloned())
                .collect()
        };
        Self::deliver(&targets, &encode_frame(tag, payload))
    }

    fn deliver(targets: &[Arc<Session>], frame: &[u8]) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for session in targets {
            match session.send_frame(frame.to_vec()) {
                Ok(()) => report.delivered += 1,
                Err(e @ SessionError::Full(_)) => {
                    warn!("Dropping frame: {}", e);
                    report.failed += 1;
                }
                Err(e) => {
                    debug!("Broadcast send failed: {}", e);
                    report.failed += 1;
                }
            }
        }
        report
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
