//! Shared error types including RFC7807 Problem Details.

use serde::{Deserialize, Serialize};

/// Errors raised while decoding or validating wire data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid channel id '{0}'")]
    InvalidChannelId(String),

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// RFC7807 Problem Details (application/problem+json)
///
/// Canonical error envelope for the REST endpoints around the chat layer, so
/// clients can surface a readable reason instead of failing to decode a
/// success type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    /// A URI reference that identifies the problem type.
    #[serde(rename = "type")]
    pub type_url: String,
    /// A short, human-readable summary of the problem type.
    pub title: String,
    /// HTTP status code.
    pub status: u16,
    /// Human-readable explanation specific to this occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// A URI reference that identifies the specific occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl ProblemDetails {
    fn new(slug: &str, title: &str, status: u16, detail: String) -> Self {
        Self {
            type_url: format!("https://channelchat.dev/problems/{slug}"),
            title: title.to_string(),
            status,
            detail: Some(detail),
            instance: None,
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new("bad-request", "Bad Request", 400, detail.into())
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new("not-found", "Not Found", 404, detail.into())
    }

    pub fn service_unavailable(detail: impl Into<String>) -> Self {
        Self::new("service-unavailable", "Service Unavailable", 503, detail.into())
    }

    /// Attach the request path the problem occurred on.
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }
}

/// Attempt to parse an RFC7807 (or RFC7807-ish) JSON body into a user-facing message.
/// Prefers `detail`, falls back to `title`.
pub fn try_problem_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ProblemDetails>(body).ok()?;
    if let Some(detail) = parsed.detail {
        if !detail.trim().is_empty() {
            return Some(detail);
        }
    }
    if !parsed.title.trim().is_empty() {
        return Some(parsed.title);
    }
    None
}

/// Errors from the REST collaborator endpoints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

impl ApiError {
    /// Build an HTTP error, reducing problem documents to their message.
    pub fn from_response(status: u16, body: String) -> Self {
        let body = try_problem_detail(&body).unwrap_or(body);
        ApiError::Http { status, body }
    }
}
