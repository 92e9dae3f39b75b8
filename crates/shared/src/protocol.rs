//! Wire protocol for the real-time channel chat layer.
//!
//! Every WebSocket text frame carries exactly one event encoded as
//! `{"type": "<event name>", "data": <payload>}`. Events without a payload
//! (`ping`, `pong`) omit `data`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::models::{deserialize_optional_id, ChannelId, ChatMessage, SessionId, UserSummary};

/// Value of `connection_ack.transport`.
pub const TRANSPORT_WEBSOCKET: &str = "websocket";

/// Events sent by a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    JoinChannel {
        channel_id: ChannelId,
        #[serde(
            default,
            deserialize_with = "deserialize_optional_id",
            skip_serializing_if = "Option::is_none"
        )]
        user_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_nickname: Option<String>,
    },
    LeaveChannel {
        channel_id: ChannelId,
    },
    SendMessage {
        channel_id: ChannelId,
        message: String,
    },
    Typing {
        channel_id: ChannelId,
    },
    Ping,
}

impl ClientCommand {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::JoinChannel { .. } => "join_channel",
            ClientCommand::LeaveChannel { .. } => "leave_channel",
            ClientCommand::SendMessage { .. } => "send_message",
            ClientCommand::Typing { .. } => "typing",
            ClientCommand::Ping => "ping",
        }
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Events sent by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    ConnectionAck {
        #[serde(rename = "socketId")]
        socket_id: SessionId,
        transport: String,
        timestamp: DateTime<Utc>,
    },
    NewMessage {
        channel_id: ChannelId,
        message: ChatMessage,
    },
    UserJoined {
        channel_id: ChannelId,
        user: UserSummary,
    },
    UserLeft {
        channel_id: ChannelId,
        user: UserSummary,
    },
    UserTyping {
        channel_id: ChannelId,
        user: UserSummary,
    },
    /// Sent only to the joiner, listing everyone in the room.
    ChannelJoined {
        channel_id: ChannelId,
        participants: Vec<UserSummary>,
    },
    Pong,
    /// Non-fatal error concerning the receiving session's last request.
    Error(String),
}

/// Discriminant of [`ServerEvent`], used as the key of handler tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerEventKind {
    ConnectionAck,
    NewMessage,
    UserJoined,
    UserLeft,
    UserTyping,
    ChannelJoined,
    Pong,
    Error,
}

impl ServerEventKind {
    pub fn name(self) -> &'static str {
        match self {
            ServerEventKind::ConnectionAck => "connection_ack",
            ServerEventKind::NewMessage => "new_message",
            ServerEventKind::UserJoined => "user_joined",
            ServerEventKind::UserLeft => "user_left",
            ServerEventKind::UserTyping => "user_typing",
            ServerEventKind::ChannelJoined => "channel_joined",
            ServerEventKind::Pong => "pong",
            ServerEventKind::Error => "error",
        }
    }
}

impl ServerEvent {
    pub fn connection_ack(session_id: SessionId) -> Self {
        ServerEvent::ConnectionAck {
            socket_id: session_id,
            transport: TRANSPORT_WEBSOCKET.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(message.into())
    }

    pub fn kind(&self) -> ServerEventKind {
        match self {
            ServerEvent::ConnectionAck { .. } => ServerEventKind::ConnectionAck,
            ServerEvent::NewMessage { .. } => ServerEventKind::NewMessage,
            ServerEvent::UserJoined { .. } => ServerEventKind::UserJoined,
            ServerEvent::UserLeft { .. } => ServerEventKind::UserLeft,
            ServerEvent::UserTyping { .. } => ServerEventKind::UserTyping,
            ServerEvent::ChannelJoined { .. } => ServerEventKind::ChannelJoined,
            ServerEvent::Pong => ServerEventKind::Pong,
            ServerEvent::Error(_) => ServerEventKind::Error,
        }
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Channel the event concerns, if any.
    pub fn channel_id(&self) -> Option<&ChannelId> {
        match self {
            ServerEvent::NewMessage { channel_id, .. }
            | ServerEvent::UserJoined { channel_id, .. }
            | ServerEvent::UserLeft { channel_id, .. }
            | ServerEvent::UserTyping { channel_id, .. }
            | ServerEvent::ChannelJoined { channel_id, .. } => Some(channel_id),
            _ => None,
        }
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
