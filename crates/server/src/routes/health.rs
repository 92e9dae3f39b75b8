//! Liveness endpoint for load balancers.

use axum::Json;
use channelchat_shared::HealthResponse;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
