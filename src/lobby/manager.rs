use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::lobby::room::{Lobby, LobbyId, LOBBY_MAX_EMPTY_TIME_MS};
use crate::net::session::SessionId;

/// Lobby table plus the reverse session -> lobby index.
/// Both live under one lock so a join or leave updates them together.
#[derive(Default)]
struct LobbyTable {
    lobbies: HashMap<LobbyId, Lobby>,
    memberships: HashMap<SessionId, LobbyId>,
}

impl LobbyTable {
    fn detach(&mut self, lobby_id: LobbyId, session_id: SessionId, now: Instant) -> bool {
        let Some(lobby) = self.lobbies.get_mut(&lobby_id) else {
            return false;
        };
        if !lobby.remove_member(session_id, now) {
            return false;
        }
        if self.memberships.get(&session_id) == Some(&lobby_id) {
            self.memberships.remove(&session_id);
        }
        true
    }
}

/// Lobby registry shared by every connection task
pub struct LobbyManager {
    inner: RwLock<LobbyTable>,
    max_empty_time: Duration,
    default_map: String,
}

impl LobbyManager {
    pub fn new(max_empty_time: Duration, default_map: String) -> Self {
        Self {
            inner: RwLock::new(LobbyTable::default()),
            max_empty_time,
            default_map,
        }
    }

    /// Names need only be non-empty; duplicates are fine
    pub fn validate_name(name: &str) -> Result<(), LobbyError> {
        if name.is_empty() {
            return Err(LobbyError::EmptyName);
        }
        Ok(())
    }

    /// Create and register a lobby
    pub fn create(&self, name: &str) -> Result<Lobby, LobbyError> {
        Self::validate_name(name)?;

        let lobby = Lobby::new(name.to_string(), self.default_map.clone());
        self.inner.write().lobbies.insert(lobby.id(), lobby.clone());

        info!("Lobby '{}' created ({})", lobby.name(), lobby.id());
        Ok(lobby)
    }

    pub fn find_by_id(&self, lobby_id: LobbyId) -> Option<Lobby> {
        self.inner.read().lobbies.get(&lobby_id).cloned()
    }

    /// The lobby a session is currently a member of
    pub fn find_containing(&self, session_id: SessionId) -> Option<Lobby> {
        let table = self.inner.read();
        let lobby_id = table.memberships.get(&session_id)?;
        table.lobbies.get(lobby_id).cloned()
    }

    /// Join a session to a lobby, first dropping it from any other lobby.
    ///
    /// Returns the id of the lobby the session was forcibly removed from.
    pub fn join(&self, lobby_id: LobbyId, session_id: SessionId) -> Result<Option<LobbyId>, LobbyError> {
        let now = Instant::now();
        let mut table = self.inner.write();

        if !table.lobbies.contains_key(&lobby_id) {
            return Err(LobbyError::NotFound(lobby_id));
        }

        let previous = match table.memberships.get(&session_id).copied() {
            Some(current) if current != lobby_id => {
                table.detach(current, session_id, now);
                warn!(
                    "Session {} force-dropped from lobby {} to join {}",
                    session_id, current, lobby_id
                );
                Some(current)
            }
            _ => None,
        };

        if let Some(lobby) = table.lobbies.get_mut(&lobby_id) {
            if lobby.add_member(session_id) {
                debug!(
                    "Session {} joined lobby '{}' ({} members)",
                    session_id,
                    lobby.name(),
                    lobby.member_count()
                );
            }
        }
        table.memberships.insert(session_id, lobby_id);

        Ok(previous)
    }

    /// Remove a session from a lobby. Removing a non-member is a no-op.
    pub fn leave(&self, lobby_id: LobbyId, session_id: SessionId) -> bool {
        let removed = self.inner.write().detach(lobby_id, session_id, Instant::now());
        if removed {
            debug!("Session {} left lobby {}", session_id, lobby_id);
        } else {
            debug!(
                "Session {} is not a member of lobby {}, nothing to leave",
                session_id, lobby_id
            );
        }
        removed
    }

    /// Remove a session from whatever lobby it is in
    pub fn leave_current(&self, session_id: SessionId) -> Option<LobbyId> {
        let mut table = self.inner.write();
        let lobby_id = table.memberships.get(&session_id).copied()?;
        table.detach(lobby_id, session_id, Instant::now());
        debug!("Session {} left lobby {}", session_id, lobby_id);
        Some(lobby_id)
    }

    /// Delete every lobby that has been empty for longer than the configured limit.
    ///
    /// Nothing calls this on a timer; callers decide when to sweep.
    pub fn sweep_expired_lobbies(&self, now: Instant) -> Vec<LobbyId> {
        let mut table = self.inner.write();
        let expired: Vec<LobbyId> = table
            .lobbies
            .values()
            .filter(|lobby| lobby.is_empty() && lobby.is_expired(now, self.max_empty_time))
            .map(|lobby| lobby.id())
            .collect();

        for lobby_id in &expired {
            if let Some(lobby) = table.lobbies.remove(lobby_id) {
                info!("Lobby '{}' ({}) expired after being empty", lobby.name(), lobby.id());
            }
        }
        expired
    }

    pub fn lobby_count(&self) -> usize {
        self.inner.read().lobbies.len()
    }

    /// Sessions currently in any lobby
    pub fn total_member_count(&self) -> usize {
        self.inner.read().memberships.len()
    }

    /// Snapshot of all lobbies for listing
    pub fn list(&self) -> Vec<LobbyInfo> {
        self.inner
            .read()
            .lobbies
            .values()
            .map(|lobby| LobbyInfo {
                id: lobby.id(),
                name: lobby.name().to_string(),
                member_count: lobby.member_count(),
                empty_since: lobby.empty_since(),
            })
            .collect()
    }

    /// Drop every lobby
    pub fn shutdown_all(&self) {
        let mut table = self.inner.write();
        table.lobbies.clear();
        table.memberships.clear();
    }
}

impl Default for LobbyManager {
    fn default() -> Self {
        Self::new(Duration::from_millis(LOBBY_MAX_EMPTY_TIME_MS), String::new())
    }
}

/// Lobby information for listing
#[derive(Debug, Clone)]
pub struct LobbyInfo {
    pub id: LobbyId,
    pub name: String,
    pub member_count: usize,
    pub empty_since: Option<Instant>,
}

/// Lobby errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("Lobby name is empty")]
    EmptyName,
    #[error("Lobby {0} not found")]
    NotFound(LobbyId),
}
