//! Channel chat client: a reconnecting, heartbeat-monitored WebSocket
//! session plus the REST calls and local stores around it.

pub mod api_client;
pub mod config;
pub mod stores;
pub mod ws;

pub use api_client::ApiClient;
pub use config::{ChatProfile, ClientConfig};
pub use ws::{ChatClient, ConnectionState, SessionError, WsConnector};
