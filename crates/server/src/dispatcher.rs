//! Room fan-out.

use channelchat_shared::{ChannelId, ServerEvent, SessionId};

use crate::registry::RoomRegistry;

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: Vec<SessionId>,
}

/// Queue `event` for every member of `channel_id`, optionally skipping the
/// session that caused it. A member that can no longer receive is logged and
/// skipped; the remaining members still get the event.
pub fn broadcast_to_room(
    registry: &RoomRegistry,
    channel_id: &ChannelId,
    event: &ServerEvent,
    exclude: Option<SessionId>,
) -> Delivery {
    let mut delivery = Delivery::default();

    for member in registry.members(channel_id) {
        if Some(member.id) == exclude {
            continue;
        }
        match member.deliver(event.clone()) {
            Ok(()) => delivery.delivered += 1,
            Err(e) => {
                tracing::warn!(
                    channel_id = %channel_id,
                    event = event.name(),
                    "Skipping member during broadcast: {}",
                    e
                );
                delivery.failed.push(e.session_id);
            }
        }
    }

    tracing::debug!(
        channel_id = %channel_id,
        event = event.name(),
        delivered = delivery.delivered,
        failed = delivery.failed.len(),
        "Broadcast complete"
    );
    delivery
}
