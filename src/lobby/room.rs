use std::time::{Duration, Instant};

use smallvec::SmallVec;
use uuid::Uuid;

use crate::net::session::SessionId;

pub type LobbyId = Uuid;

/// How long a lobby may stay empty before a sweep removes it
pub const LOBBY_MAX_EMPTY_TIME_MS: u64 = 10_000;

/// A named group of sessions meant to share one game instance.
///
/// Members are held by session id only; the lobby never owns a session.
#[derive(Debug, Clone)]
pub struct Lobby {
    id: LobbyId,
    name: String,
    /// JSON map definition handed to members on join
    map_definition: String,
    members: SmallVec<[SessionId; 8]>,
    empty_since: Option<Instant>,
}

impl Lobby {
    /// New lobbies start empty, so their empty clock starts at creation
    pub fn new(name: String, map_definition: String) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            name,
            map_definition,
            members: SmallVec::new(),
            empty_since: Some(now),
        }
    }

    pub fn id(&self) -> LobbyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn map_definition(&self) -> &str {
        &self.map_definition
    }

    /// Members in join order
    pub fn members(&self) -> &[SessionId] {
        &self.members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, session_id: SessionId) -> bool {
        self.members.contains(&session_id)
    }

    pub fn empty_since(&self) -> Option<Instant> {
        self.empty_since
    }

    /// Append a member. Returns false if it was already present.
    pub(crate) fn add_member(&mut self, session_id: SessionId) -> bool {
        if self.contains(session_id) {
            return false;
        }
        self.members.push(session_id);
        self.empty_since = None;
        true
    }

    /// Remove a member, stamping `empty_since` with `now` if it was the last one.
    /// Returns false if the session was not a member.
    pub(crate) fn remove_member(&mut self, session_id: SessionId, now: Instant) -> bool {
        let Some(index) = self.members.iter().position(|id| *id == session_id) else {
            return false;
        };
        self.members.remove(index);
        if self.members.is_empty() {
            self.empty_since = Some(now);
        }
        true
    }

    /// Whether the lobby has been empty for longer than `max_empty`
    pub fn is_expired(&self, now: Instant, max_empty: Duration) -> bool {
        match self.empty_since {
            Some(since) => now.saturating_duration_since(since) > max_empty,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lobby() -> Lobby {
        Lobby::new("Arena1".to_string(), String::new())
    }

    #[test]
    fn test_lobby_new() {
        let lobby = lobby();
        assert!(lobby.is_empty());
        assert_eq!(lobby.name(), "Arena1");
        assert!(lobby.empty_since().is_some());
    }

    #[test]
    fn test_members_keep_join_order() {
        let mut lobby = lobby();
        let ids: Vec<SessionId> = (0..10).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            assert!(lobby.add_member(*id));
        }

        assert_eq!(lobby.members(), ids.as_slice());
        assert!(lobby.empty_since().is_none());

        // Duplicate join is ignored
        assert!(!lobby.add_member(ids[3]));
        assert_eq!(lobby.member_count(), 10);
    }

    #[test]
    fn test_remove_member_stamps_empty_since() {
        let mut lobby = lobby();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        lobby.add_member(a);
        lobby.add_member(b);

        let now = Instant::now();
        assert!(lobby.remove_member(a, now));
        assert!(lobby.empty_since().is_none());

        assert!(lobby.remove_member(b, now));
        assert_eq!(lobby.empty_since(), Some(now));
    }

    #[test]
    fn test_remove_absent_member() {
        let mut lobby = lobby();
        lobby.add_member(Uuid::new_v4());
        assert!(!lobby.remove_member(Uuid::new_v4(), Instant::now()));
        assert_eq!(lobby.member_count(), 1);
    }

    #[test]
    fn test_rejoin_clears_empty_since() {
        let mut lobby = lobby();
        let a = Uuid::new_v4();
        lobby.add_member(a);
        lobby.remove_member(a, Instant::now());
        assert!(lobby.empty_since().is_some());

        lobby.add_member(a);
        assert!(lobby.empty_since().is_none());
    }

    #[test]
    fn test_is_expired() {
        let mut lobby = lobby();
        let a = Uuid::new_v4();
        lobby.add_member(a);

        let max = Duration::from_millis(LOBBY_MAX_EMPTY_TIME_MS);
        let left_at = Instant::now();
        assert!(!lobby.is_expired(left_at + Duration::from_secs(60), max));

        lobby.remove_member(a, left_at);
        assert!(!lobby.is_expired(left_at + max, max));
        assert!(lobby.is_expired(left_at + max + Duration::from_millis(1), max));
    }
}
