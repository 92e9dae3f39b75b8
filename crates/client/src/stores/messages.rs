//! Message store for managing channel messages.
//!
//! Messages are organized by channel_id, and each channel tracks whether its
//! history has been loaded from the REST API. Live messages and fetched
//! history are merged, so a message seen both ways is stored once.

use std::collections::HashMap;

use channelchat_shared::{ChannelId, ChatMessage, ServerEvent};

/// Messages for a single channel.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChannelMessages {
    /// All messages in this channel, sorted by created_at then id.
    pub messages: Vec<ChatMessage>,
    /// Whether the channel history has been fetched from the REST API.
    pub is_loaded: bool,
}

impl ChannelMessages {
    /// Add a message to the channel, maintaining sort order.
    /// Returns false if a message with the same ID already exists (deduplication).
    pub fn add_message(&mut self, msg: ChatMessage) -> bool {
        if self.messages.iter().any(|m| m.id == msg.id) {
            return false;
        }

        let pos = self
            .messages
            .binary_search_by(|m| (m.created_at, m.id).cmp(&(msg.created_at, msg.id)))
            .unwrap_or_else(|pos| pos);

        self.messages.insert(pos, msg);
        true
    }

    /// Merge fetched history with whatever arrived live, and mark the
    /// channel as loaded.
    pub fn set_history(&mut self, history: Vec<ChatMessage>) {
        for msg in history {
            self.add_message(msg);
        }
        self.is_loaded = true;
    }

    pub fn latest(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Message store keyed by channel_id.
#[derive(Debug, Default, Clone)]
pub struct MessageStore {
    channels: HashMap<ChannelId, ChannelMessages>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, channel_id: &ChannelId) -> Option<&ChannelMessages> {
        self.channels.get(channel_id)
    }

    pub fn channel_mut(&mut self, channel_id: &ChannelId) -> &mut ChannelMessages {
        self.channels.entry(channel_id.clone()).or_default()
    }

    /// Store the message carried by a `new_message` event. Returns true when
    /// the message was new.
    pub fn apply(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::NewMessage { channel_id, message } => {
                self.channel_mut(channel_id).add_message(message.clone())
            }
            _ => false,
        }
    }
}
