//! REST route handlers around the real-time layer.

pub mod channel_chat;
pub mod health;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use channelchat_shared::ProblemDetails;

/// A `ProblemDetails` document returned as `application/problem+json`.
#[derive(Debug)]
pub struct Problem(pub ProblemDetails);

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            [(header::CONTENT_TYPE, "application/problem+json")],
            Json(self.0),
        )
            .into_response()
    }
}
