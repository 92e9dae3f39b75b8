//! Application state shared across request handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::hub::{Hub, HubHandle};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Start the chat hub and wrap it with the configuration.
    pub fn new(config: ServerConfig) -> Self {
        let hub = Hub::new(config.max_message_len).spawn();
        Self {
            hub,
            config: Arc::new(config),
        }
    }
}
