//! Channel chat server: rooms, presence and broadcast over WebSockets.

pub mod config;
pub mod dispatcher;
pub mod heartbeat;
pub mod hub;
pub mod presence;
pub mod registry;
pub mod routes;
pub mod state;
pub mod ws;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;
pub use state::AppState;

/// Build the HTTP router serving the chat endpoint and its REST companions.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health::health))
        .route(
            "/channel-chat/{id}/participants",
            get(routes::channel_chat::participants),
        )
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
