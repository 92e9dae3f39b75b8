//! WebSocket side of the chat client.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 ChatClient                   │
//! │   (handle: send / on_event / close / status) │
//! └──────────────────────────────────────────────┘
//!                       │ commands
//!                       ▼
//! ┌──────────────────────────────────────────────┐
//! │                driver task                   │
//! │  ReconnectController   HeartbeatMonitor      │
//! │  handler tables        replayed join         │
//! └──────────────────────────────────────────────┘
//!                       │
//!                       ▼
//!        Connector ──► Transport (WebSocket or in-memory)
//! ```
//!
//! Handlers registered with [`ChatClient::on_event`] are where callers feed
//! their stores (see [`crate::stores`]).

pub mod heartbeat;
pub mod reconnect;
mod session;
pub mod transport;

pub use heartbeat::{HeartbeatMonitor, Liveness};
pub use reconnect::{Backoff, ConnectionState, ReconnectController, ReconnectPolicy, RetryDecision};
pub use session::{ChatClient, ErrorHandler, EventHandler, SessionError};
pub use transport::{Connector, Transport, TransportError, WsConnector};
