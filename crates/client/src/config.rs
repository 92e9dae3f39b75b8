//! Client configuration from environment variables.

use std::time::Duration;

use channelchat_shared::ChannelId;

use crate::ws::reconnect::ReconnectPolicy;

pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8080/ws";
const DEFAULT_PING_INTERVAL_SECS: u64 = 30;
const DEFAULT_HEARTBEAT_GRACE_SECS: u64 = 60;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Settings for one chat session and its REST companion.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint of the chat server.
    pub server_url: String,
    /// Credential appended to the upgrade request, if any.
    pub auth_token: Option<String>,
    /// Base URL of the REST collaborator (history, participants).
    pub api_url: Option<String>,
    pub ping_interval: Duration,
    pub heartbeat_grace: Duration,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            auth_token: None,
            api_url: None,
            ping_interval: Duration::from_secs(DEFAULT_PING_INTERVAL_SECS),
            heartbeat_grace: Duration::from_secs(DEFAULT_HEARTBEAT_GRACE_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CHANNELCHAT_SERVER_URL`: transport endpoint (default: "ws://localhost:8080/ws")
    /// - `CHANNELCHAT_API_URL`: REST collaborator base URL (optional)
    /// - `CHANNELCHAT_AUTH_TOKEN`: auth hint sent on connect (optional)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            server_url: non_empty(lookup("CHANNELCHAT_SERVER_URL"))
                .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            auth_token: non_empty(lookup("CHANNELCHAT_AUTH_TOKEN")),
            api_url: non_empty(lookup("CHANNELCHAT_API_URL")),
            ..Self::default()
        }
    }
}

/// Who the terminal client chats as, and where.
#[derive(Debug, Clone, Default)]
pub struct ChatProfile {
    pub channel: Option<ChannelId>,
    pub nickname: Option<String>,
    pub user_id: Option<String>,
}

impl ChatProfile {
    /// Reads `CHANNELCHAT_CHANNEL`, `CHANNELCHAT_NICKNAME` and `CHANNELCHAT_USER_ID`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let channel = non_empty(lookup("CHANNELCHAT_CHANNEL")).and_then(|raw| {
            ChannelId::parse(raw.as_str())
                .map_err(|e| tracing::warn!(value = %raw, "Ignoring channel: {}", e))
                .ok()
        });
        Self {
            channel,
            nickname: non_empty(lookup("CHANNELCHAT_NICKNAME")),
            user_id: non_empty(lookup("CHANNELCHAT_USER_ID")),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
