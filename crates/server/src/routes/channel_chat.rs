//! Live room state exposed over REST.

use axum::{
    extract::{Path, State},
    Json,
};
use channelchat_shared::{ChannelId, ParticipantsResponse, ProblemDetails};

use super::Problem;
use crate::state::AppState;

/// `GET /channel-chat/{id}/participants`: who is in the room right now.
pub async fn participants(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<ParticipantsResponse>, Problem> {
    let instance = format!("/channel-chat/{raw_id}/participants");

    let channel_id = ChannelId::parse(raw_id)
        .map_err(|e| Problem(ProblemDetails::bad_request(e.to_string()).with_instance(&instance)))?;

    let participants = state.hub.participants(channel_id.clone()).await.map_err(|e| {
        tracing::error!("Participants lookup failed: {}", e);
        Problem(ProblemDetails::service_unavailable(e.to_string()).with_instance(&instance))
    })?;

    Ok(Json(ParticipantsResponse::new(channel_id, participants)))
}
