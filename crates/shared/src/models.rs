//! Shared data models for the channel chat protocol.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;

/// Longest channel identifier accepted from the wire.
pub const MAX_CHANNEL_ID_LEN: usize = 64;

// --- Identifiers ---

/// Identifier as it may appear on the wire: board ids are numeric in some
/// clients and strings in others.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

/// Identifier of a channel, and therefore of the room for that channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawId", into = "String")]
pub struct ChannelId(String);

impl ChannelId {
    /// Validate and wrap a channel identifier.
    pub fn parse(id: impl Into<String>) -> Result<Self, ProtocolError> {
        let id = id.into();
        if id.is_empty()
            || id.chars().count() > MAX_CHANNEL_ID_LEN
            || id.chars().any(char::is_whitespace)
        {
            return Err(ProtocolError::InvalidChannelId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<RawId> for ChannelId {
    type Error = ProtocolError;

    fn try_from(raw: RawId) -> Result<Self, Self::Error> {
        Self::parse(String::from(raw))
    }
}

impl From<ChannelId> for String {
    fn from(id: ChannelId) -> Self {
        id.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for ChannelId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Identity of one connection instance. A reconnecting client gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Deserialize an optional user id given either as a string or an integer.
pub fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}

// --- Users ---

/// Public identity of a session as shown to other room members.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    /// Account id, absent for anonymous viewers.
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub id: Option<String>,
    pub nickname: String,
    pub session_id: SessionId,
}

// --- Messages ---

/// A chat message as accepted and numbered by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: u64,
    pub channel_id: ChannelId,
    #[serde(rename = "message")]
    pub body: String,
    pub user: UserSummary,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub next_cursor: Option<String>,
    pub prev_cursor: Option<String>,
}

/// One page of channel history from the REST collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagesPage {
    pub items: Vec<ChatMessage>,
    pub page: PageInfo,
}

// --- Participants ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipantsResponse {
    pub channel_id: ChannelId,
    pub participants: Vec<UserSummary>,
    pub count: usize,
}

impl ParticipantsResponse {
    pub fn new(channel_id: ChannelId, participants: Vec<UserSummary>) -> Self {
        Self {
            channel_id,
            count: participants.len(),
            participants,
        }
    }
}

/// Response of the join/leave collaborator endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MembershipResponse {
    pub channel_id: ChannelId,
    #[serde(default)]
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_accepts_numbers_and_strings() {
        let from_number: ChannelId = serde_json::from_str("42").unwrap();
        let from_text: ChannelId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(from_number, from_text);
        assert_eq!(serde_json::to_string(&from_number).unwrap(), "\"42\"");
    }

    #[test]
    fn channel_id_rejects_blank_and_spaced_ids() {
        assert!(ChannelId::parse("").is_err());
        assert!(ChannelId::parse("general chat").is_err());
        assert!(ChannelId::parse("x".repeat(MAX_CHANNEL_ID_LEN + 1)).is_err());
        assert!(serde_json::from_str::<ChannelId>("\"\"").is_err());
        assert!(ChannelId::parse("free-board").is_ok());
    }

    #[test]
    fn chat_message_uses_wire_field_names() {
        let session_id = SessionId::new();
        let message = ChatMessage {
            id: 1001,
            channel_id: ChannelId::from(42),
            body: "hello".to_string(),
            user: UserSummary {
                id: None,
                nickname: "guest".to_string(),
                session_id,
            },
            created_at: Utc::now(),
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["id"], 1001);
        assert_eq!(value["channel_id"], "42");
        assert_eq!(value["message"], "hello");
        assert_eq!(value["user"]["nickname"], "guest");
        assert!(value["user"]["id"].is_null());
        assert!(value.get("body").is_none());
    }

    #[test]
    fn user_summary_accepts_numeric_user_id() {
        let session_id = SessionId::new();
        let json = format!(r#"{{"id":17,"nickname":"kim","session_id":"{session_id}"}}"#);
        let user: UserSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(user.id.as_deref(), Some("17"));
    }
}
