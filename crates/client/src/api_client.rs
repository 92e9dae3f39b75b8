//! HTTP client for the REST endpoints around the chat layer.

use channelchat_shared::{ApiError, ChannelId, MembershipResponse, MessagesPage, ParticipantsResponse};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// HTTP client for the channel-chat REST collaborator.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            auth_token: None,
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send `token` as a bearer credential on every request.
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token.filter(|t| !t.is_empty());
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    fn authorize(&self, rb: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    /// Make a GET request
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let rb = self.authorize(self.client.get(self.url(path)));
        execute(rb).await
    }

    /// Make a POST request with JSON body
    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let body_bytes = serde_json::to_vec(body).map_err(|e| ApiError::Deserialize(e.to_string()))?;
        let rb = self
            .authorize(self.client.post(self.url(path)))
            .header("Content-Type", "application/json")
            .body(body_bytes);
        execute(rb).await
    }

    // --- Channel chat endpoints ---

    pub async fn join_channel(&self, channel_id: &ChannelId) -> Result<MembershipResponse, ApiError> {
        self.post_json(&channel_path(channel_id, "join"), &serde_json::json!({}))
            .await
    }

    pub async fn leave_channel(&self, channel_id: &ChannelId) -> Result<MembershipResponse, ApiError> {
        self.post_json(&channel_path(channel_id, "leave"), &serde_json::json!({}))
            .await
    }

    /// One page of history. Pass a cursor from a previous [`MessagesPage`] to continue.
    pub async fn messages(
        &self,
        channel_id: &ChannelId,
        cursor: Option<&str>,
    ) -> Result<MessagesPage, ApiError> {
        let mut path = channel_path(channel_id, "messages");
        if let Some(cursor) = cursor {
            path.push_str(&format!("?cursor={}", urlencoding::encode(cursor)));
        }
        self.get_json(&path).await
    }

    pub async fn participants(&self, channel_id: &ChannelId) -> Result<ParticipantsResponse, ApiError> {
        self.get_json(&channel_path(channel_id, "participants")).await
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

fn channel_path(channel_id: &ChannelId, action: &str) -> String {
    format!(
        "/channel-chat/{}/{action}",
        urlencoding::encode(channel_id.as_str())
    )
}

async fn execute<TRes: DeserializeOwned>(rb: RequestBuilder) -> Result<TRes, ApiError> {
    let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;

    let status = resp.status().as_u16();
    let is_success = resp.status().is_success();
    let text = resp
        .text()
        .await
        .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

    if !is_success {
        return Err(ApiError::from_response(status, text));
    }

    if text.is_empty() {
        serde_json::from_str("null").map_err(|e| ApiError::Deserialize(e.to_string()))
    } else {
        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_base_url_and_path() {
        let api = ApiClient::new().with_base_url("http://localhost:8080/");
        assert_eq!(api.url("/health"), "http://localhost:8080/health");
        assert_eq!(api.url("health"), "http://localhost:8080/health");
        assert_eq!(api.url("https://other.example/x"), "https://other.example/x");
    }

    #[test]
    fn relative_paths_without_base_url() {
        let api = ApiClient::new();
        assert_eq!(api.url("channel-chat/1/messages"), "/channel-chat/1/messages");
    }

    #[test]
    fn channel_paths_are_escaped() {
        assert_eq!(
            channel_path(&ChannelId::from(42), "participants"),
            "/channel-chat/42/participants"
        );
        assert_eq!(
            channel_path(&ChannelId::parse("a/b").unwrap(), "join"),
            "/channel-chat/a%2Fb/join"
        );
    }

    #[test]
    fn blank_token_is_not_sent() {
        let api = ApiClient::new().with_auth_token(Some(String::new()));
        assert!(api.auth_token.is_none());
    }
}
