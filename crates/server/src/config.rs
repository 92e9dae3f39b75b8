//! Server configuration from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
const DEFAULT_HEARTBEAT_GRACE_SECS: u64 = 60;
const DEFAULT_MAX_MESSAGE_LEN: usize = 2000;

/// Liveness settings for the per-session watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSettings {
    /// How often each session checks its own silence.
    pub interval: Duration,
    /// Silence after which a session is considered dead.
    pub grace: Duration,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            grace: Duration::from_secs(DEFAULT_HEARTBEAT_GRACE_SECS),
        }
    }
}

/// Runtime configuration of the chat server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub heartbeat: HeartbeatSettings,
    /// Maximum chat body length in characters.
    pub max_message_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            heartbeat: HeartbeatSettings::default(),
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CHANNELCHAT_BIND_ADDR`: listen address (default: "0.0.0.0:8080")
    /// - `CHANNELCHAT_HEARTBEAT_INTERVAL_SECS`: watchdog period (default: 30)
    /// - `CHANNELCHAT_HEARTBEAT_GRACE_SECS`: allowed silence (default: 60)
    /// - `CHANNELCHAT_MAX_MESSAGE_LEN`: max chat body length (default: 2000)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let interval = parse_or(
            "CHANNELCHAT_HEARTBEAT_INTERVAL_SECS",
            &lookup,
            DEFAULT_HEARTBEAT_INTERVAL_SECS,
        );
        let grace = parse_or(
            "CHANNELCHAT_HEARTBEAT_GRACE_SECS",
            &lookup,
            DEFAULT_HEARTBEAT_GRACE_SECS,
        );

        Self {
            bind_addr: parse_or("CHANNELCHAT_BIND_ADDR", &lookup, default_bind_addr()),
            heartbeat: HeartbeatSettings {
                interval: Duration::from_secs(interval.max(1)),
                grace: Duration::from_secs(grace.max(1)),
            },
            max_message_len: parse_or(
                "CHANNELCHAT_MAX_MESSAGE_LEN",
                &lookup,
                DEFAULT_MAX_MESSAGE_LEN,
            ),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Read `key` and parse it, warning and falling back to `default` on bad input.
fn parse_or<T: FromStr>(key: &str, lookup: &impl Fn(&str) -> Option<String>, default: T) -> T {
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring invalid configuration value");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = ServerConfig::from_lookup(lookup(&[]));
        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 8080)));
        assert_eq!(config.heartbeat, HeartbeatSettings::default());
        assert_eq!(config.max_message_len, 2000);
    }

    #[test]
    fn values_are_read_from_environment() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("CHANNELCHAT_BIND_ADDR", "127.0.0.1:9000"),
            ("CHANNELCHAT_HEARTBEAT_INTERVAL_SECS", "10"),
            ("CHANNELCHAT_HEARTBEAT_GRACE_SECS", "20"),
            ("CHANNELCHAT_MAX_MESSAGE_LEN", "140"),
        ]));
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 9000)));
        assert_eq!(config.heartbeat.interval, Duration::from_secs(10));
        assert_eq!(config.heartbeat.grace, Duration::from_secs(20));
        assert_eq!(config.max_message_len, 140);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("CHANNELCHAT_BIND_ADDR", "nowhere"),
            ("CHANNELCHAT_HEARTBEAT_GRACE_SECS", "-5"),
        ]));
        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 8080)));
        assert_eq!(config.heartbeat.grace, Duration::from_secs(60));
    }
}
