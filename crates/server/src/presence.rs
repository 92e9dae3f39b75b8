//! Presence notifications derived from registry membership changes.
//!
//! Nothing here keeps state: joins and leaves are announced from what the
//! registry reports, and typing indicators are relayed as they arrive.

use channelchat_shared::{ChannelId, ServerEvent, SessionId, UserSummary};

use crate::dispatcher::{broadcast_to_room, Delivery};
use crate::registry::RoomRegistry;

/// Tell the rest of `channel_id` that `user` arrived.
pub fn announce_joined(registry: &RoomRegistry, channel_id: &ChannelId, user: &UserSummary) -> Delivery {
    let event = ServerEvent::UserJoined {
        channel_id: channel_id.clone(),
        user: user.clone(),
    };
    broadcast_to_room(registry, channel_id, &event, Some(user.session_id))
}

/// Tell the remaining members of `channel_id` that `user` is gone.
pub fn announce_left(registry: &RoomRegistry, channel_id: &ChannelId, user: &UserSummary) -> Delivery {
    let event = ServerEvent::UserLeft {
        channel_id: channel_id.clone(),
        user: user.clone(),
    };
    broadcast_to_room(registry, channel_id, &event, Some(user.session_id))
}

/// Relay a typing indicator to everyone in the room except the typist.
pub fn relay_typing(registry: &RoomRegistry, channel_id: &ChannelId, sender: SessionId) -> Option<Delivery> {
    let user = registry.session(sender)?.summary();
    let event = ServerEvent::UserTyping {
        channel_id: channel_id.clone(),
        user,
    };
    Some(broadcast_to_room(registry, channel_id, &event, Some(sender)))
}
