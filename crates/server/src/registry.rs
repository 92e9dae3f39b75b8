//! Room registry: which sessions are in which channel room.
//!
//! The registry is plain data owned by the hub task; it is never shared
//! behind a lock. Every session has at most one current room, and a session
//! is listed in a room's member set exactly when that room is its
//! `current_room`.

use std::collections::{HashMap, HashSet};

use channelchat_shared::{ChannelId, ServerEvent, SessionId, UserSummary};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Queue feeding one session's socket writer.
pub type Outbound = mpsc::UnboundedSender<ServerEvent>;

/// Nickname used when a client joins without one.
pub const ANONYMOUS_NICKNAME: &str = "anonymous";

/// Server-side state of one connected session.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub user_id: Option<String>,
    pub nickname: String,
    pub connected_at: DateTime<Utc>,
    current_room: Option<ChannelId>,
    outbound: Outbound,
}

impl Session {
    pub fn new(id: SessionId, outbound: Outbound) -> Self {
        Self {
            id,
            user_id: None,
            nickname: ANONYMOUS_NICKNAME.to_string(),
            connected_at: Utc::now(),
            current_room: None,
            outbound,
        }
    }

    pub fn current_room(&self) -> Option<&ChannelId> {
        self.current_room.as_ref()
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.user_id.clone(),
            nickname: self.nickname.clone(),
            session_id: self.id,
        }
    }

    /// Queue an event for this session's socket. Fails once the socket task
    /// has gone away.
    pub fn deliver(&self, event: ServerEvent) -> Result<(), DeliveryError> {
        self.outbound
            .send(event)
            .map_err(|_| DeliveryError { session_id: self.id })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("session {session_id} is no longer receiving")]
pub struct DeliveryError {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
}

/// Result of [`RoomRegistry::join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The session entered the room, leaving `previous` if it was elsewhere.
    Joined { previous: Option<ChannelId> },
    /// The session was already a member; nothing changed.
    AlreadyMember,
}

#[derive(Debug, Default)]
pub struct RoomRegistry {
    sessions: HashMap<SessionId, Session>,
    rooms: HashMap<ChannelId, HashSet<SessionId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_session(&mut self, session: Session) {
        if let Some(stale) = self.sessions.insert(session.id, session) {
            tracing::warn!(session_id = %stale.id, "Replaced an already registered session");
        }
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Update the public identity a session presents to its room.
    pub fn identify(
        &mut self,
        id: SessionId,
        user_id: Option<String>,
        nickname: Option<String>,
    ) -> Result<(), RegistryError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(RegistryError::UnknownSession(id))?;
        if user_id.is_some() {
            session.user_id = user_id;
        }
        if let Some(nickname) = nickname.map(|n| n.trim().to_string()) {
            if !nickname.is_empty() {
                session.nickname = nickname;
            }
        }
        Ok(())
    }

    /// Put a session into `channel_id`, leaving its previous room first.
    pub fn join(&mut self, id: SessionId, channel_id: &ChannelId) -> Result<JoinOutcome, RegistryError> {
        let current = self
            .sessions
            .get(&id)
            .ok_or(RegistryError::UnknownSession(id))?
            .current_room
            .clone();

        if current.as_ref() == Some(channel_id) {
            return Ok(JoinOutcome::AlreadyMember);
        }

        if let Some(previous) = &current {
            self.leave(id, previous);
        }

        self.rooms.entry(channel_id.clone()).or_default().insert(id);
        if let Some(session) = self.sessions.get_mut(&id) {
            session.current_room = Some(channel_id.clone());
        }

        Ok(JoinOutcome::Joined { previous: current })
    }

    /// Remove a session from `channel_id`. Returns whether it was a member;
    /// leaving a room twice is harmless.
    pub fn leave(&mut self, id: SessionId, channel_id: &ChannelId) -> bool {
        let removed = match self.rooms.get_mut(channel_id) {
            Some(members) => {
                let removed = members.remove(&id);
                if members.is_empty() {
                    self.rooms.remove(channel_id);
                    tracing::debug!(channel_id = %channel_id, "Discarded empty room");
                }
                removed
            }
            None => false,
        };

        if let Some(session) = self.sessions.get_mut(&id) {
            if session.current_room.as_ref() == Some(channel_id) {
                session.current_room = None;
            }
        }

        removed
    }

    /// Drop a session entirely, leaving whatever room it occupied.
    /// Returns the session and the room it was removed from.
    pub fn on_disconnect(&mut self, id: SessionId) -> Option<(Session, Option<ChannelId>)> {
        let room = self.sessions.get(&id)?.current_room.clone();
        if let Some(channel_id) = &room {
            self.leave(id, channel_id);
        }
        let session = self.sessions.remove(&id)?;
        Some((session, room))
    }

    /// Sessions currently in `channel_id`, in no particular order.
    pub fn members<'a>(&'a self, channel_id: &ChannelId) -> impl Iterator<Item = &'a Session> + 'a {
        self.rooms
            .get(channel_id)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.sessions.get(id))
    }

    /// Public identities of a room's members, ordered by nickname.
    pub fn participants(&self, channel_id: &ChannelId) -> Vec<UserSummary> {
        let mut participants: Vec<UserSummary> =
            self.members(channel_id).map(Session::summary).collect();
        participants.sort_by(|a, b| {
            a.nickname
                .cmp(&b.nickname)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        participants
    }

    pub fn is_member(&self, id: SessionId, channel_id: &ChannelId) -> bool {
        self.rooms
            .get(channel_id)
            .is_some_and(|members| members.contains(&id))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Panics if a session's `current_room` disagrees with the member sets.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for (id, session) in &self.sessions {
            let rooms_listing: Vec<&ChannelId> = self
                .rooms
                .iter()
                .filter(|(_, members)| members.contains(id))
                .map(|(channel_id, _)| channel_id)
                .collect();
            match &session.current_room {
                Some(room) => assert_eq!(rooms_listing, vec![room], "session {id}"),
                None => assert!(rooms_listing.is_empty(), "session {id} listed in {rooms_listing:?}"),
            }
        }
        for (channel_id, members) in &self.rooms {
            assert!(!members.is_empty(), "empty room {channel_id} kept");
            for id in members {
                assert!(self.sessions.contains_key(id), "stale member {id} in {channel_id}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(n: usize) -> (RoomRegistry, Vec<SessionId>, Vec<mpsc::UnboundedReceiver<ServerEvent>>) {
        let mut registry = RoomRegistry::new();
        let mut ids = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..n {
            let (tx, rx) = mpsc::unbounded_channel();
            let id = SessionId::new();
            registry.insert_session(Session::new(id, tx));
            ids.push(id);
            receivers.push(rx);
        }
        (registry, ids, receivers)
    }

    #[test]
    fn join_moves_session_between_rooms() {
        let (mut registry, ids, _rx) = registry_with(1);
        let general = ChannelId::from(1);
        let market = ChannelId::from(2);

        assert_eq!(
            registry.join(ids[0], &general).unwrap(),
            JoinOutcome::Joined { previous: None }
        );
        assert_eq!(
            registry.join(ids[0], &market).unwrap(),
            JoinOutcome::Joined { previous: Some(general.clone()) }
        );

        assert!(!registry.is_member(ids[0], &general));
        assert!(registry.is_member(ids[0], &market));
        assert_eq!(registry.session(ids[0]).unwrap().current_room(), Some(&market));
        assert_eq!(registry.room_count(), 1);
        registry.assert_consistent();
    }

    #[test]
    fn duplicate_join_is_a_no_op() {
        let (mut registry, ids, _rx) = registry_with(1);
        let room = ChannelId::from(42);
        registry.join(ids[0], &room).unwrap();
        assert_eq!(registry.join(ids[0], &room).unwrap(), JoinOutcome::AlreadyMember);
        assert_eq!(registry.members(&room).count(), 1);
        registry.assert_consistent();
    }

    #[test]
    fn leave_twice_has_the_effect_of_leaving_once() {
        let (mut registry, ids, _rx) = registry_with(2);
        let room = ChannelId::from(7);
        registry.join(ids[0], &room).unwrap();
        registry.join(ids[1], &room).unwrap();

        assert!(registry.leave(ids[0], &room));
        assert!(!registry.leave(ids[0], &room));

        assert_eq!(registry.members(&room).count(), 1);
        assert!(registry.session(ids[0]).unwrap().current_room().is_none());
        registry.assert_consistent();
    }

    #[test]
    fn leaving_a_room_one_is_not_in_keeps_current_room() {
        let (mut registry, ids, _rx) = registry_with(1);
        registry.join(ids[0], &ChannelId::from(1)).unwrap();
        assert!(!registry.leave(ids[0], &ChannelId::from(2)));
        assert_eq!(registry.session(ids[0]).unwrap().current_room(), Some(&ChannelId::from(1)));
        registry.assert_consistent();
    }

    #[test]
    fn empty_rooms_are_discarded() {
        let (mut registry, ids, _rx) = registry_with(1);
        let room = ChannelId::from(3);
        registry.join(ids[0], &room).unwrap();
        registry.leave(ids[0], &room);
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn disconnect_leaves_no_stale_membership() {
        let (mut registry, ids, _rx) = registry_with(2);
        let room = ChannelId::from(7);
        registry.join(ids[0], &room).unwrap();
        registry.join(ids[1], &room).unwrap();

        let (session, left) = registry.on_disconnect(ids[0]).unwrap();
        assert_eq!(session.id, ids[0]);
        assert_eq!(left, Some(room.clone()));
        assert!(registry.on_disconnect(ids[0]).is_none());

        let remaining: Vec<SessionId> = registry.members(&room).map(|s| s.id).collect();
        assert_eq!(remaining, vec![ids[1]]);
        assert_eq!(registry.session_count(), 1);
        registry.assert_consistent();
    }

    #[test]
    fn join_of_unknown_session_fails() {
        let mut registry = RoomRegistry::new();
        let stranger = SessionId::new();
        assert_eq!(
            registry.join(stranger, &ChannelId::from(1)),
            Err(RegistryError::UnknownSession(stranger))
        );
    }

    #[test]
    fn identify_ignores_blank_nicknames() {
        let (mut registry, ids, _rx) = registry_with(1);
        registry
            .identify(ids[0], Some("12".to_string()), Some("  ".to_string()))
            .unwrap();
        let summary = registry.session(ids[0]).unwrap().summary();
        assert_eq!(summary.id.as_deref(), Some("12"));
        assert_eq!(summary.nickname, ANONYMOUS_NICKNAME);

        registry.identify(ids[0], None, Some(" choi ".to_string())).unwrap();
        assert_eq!(registry.session(ids[0]).unwrap().nickname, "choi");
    }
}
