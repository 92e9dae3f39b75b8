//! Presence store for the members of a channel.
//!
//! Fed from room events only: `channel_joined` replaces the member list,
//! `user_joined` and `user_left` adjust it. Typing indicators are transient
//! and not stored.

use std::collections::BTreeMap;

use channelchat_shared::{ChannelId, ServerEvent, SessionId, UserSummary};

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPresence {
    channel_id: ChannelId,
    participants: BTreeMap<SessionId, UserSummary>,
}

impl ChannelPresence {
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            participants: BTreeMap::new(),
        }
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// Update from a room event. Returns true if the member list changed.
    pub fn apply(&mut self, event: &ServerEvent) -> bool {
        if event.channel_id() != Some(&self.channel_id) {
            return false;
        }
        match event {
            ServerEvent::ChannelJoined { participants, .. } => {
                self.participants = participants
                    .iter()
                    .map(|user| (user.session_id, user.clone()))
                    .collect();
                true
            }
            ServerEvent::UserJoined { user, .. } => {
                self.participants.insert(user.session_id, user.clone()) != Some(user.clone())
            }
            ServerEvent::UserLeft { user, .. } => self.participants.remove(&user.session_id).is_some(),
            _ => false,
        }
    }

    pub fn contains(&self, session_id: SessionId) -> bool {
        self.participants.contains_key(&session_id)
    }

    pub fn count(&self) -> usize {
        self.participants.len()
    }

    /// Member nicknames, sorted for display.
    pub fn nicknames(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .participants
            .values()
            .map(|user| user.nickname.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn clear(&mut self) {
        self.participants.clear();
    }
}
