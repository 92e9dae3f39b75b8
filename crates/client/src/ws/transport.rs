//! Duplex text transport underneath a chat session.
//!
//! The session logic only needs "send a frame", "receive the next frame" and
//! "close", so it talks to [`Transport`] and obtains one from a
//! [`Connector`]. [`WsConnector`] is the tokio-tungstenite implementation
//! used by the binary; tests plug in in-memory doubles.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("invalid server url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("receive failed: {0}")]
    Receive(String),
}

/// One open connection carrying text frames.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Next text frame. `None` means the peer closed the connection.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens transports to a server.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        server_url: &str,
        auth_token: Option<&str>,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

/// Build the upgrade URL, carrying the auth hint as the `token` query parameter.
pub fn connect_url(server_url: &str, auth_token: Option<&str>) -> Result<Url, TransportError> {
    let mut url = Url::parse(server_url).map_err(|e| TransportError::InvalidUrl {
        url: server_url.to_string(),
        reason: e.to_string(),
    })?;
    if let Some(token) = auth_token.filter(|t| !t.is_empty()) {
        url.query_pairs_mut().append_pair("token", token);
    }
    Ok(url)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        server_url: &str,
        auth_token: Option<&str>,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let url = connect_url(server_url, auth_token)?;
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        tracing::debug!(url = %server_url, "WebSocket handshake complete");
        Ok(Box::new(WsTransport { stream }))
    }
}

/// tokio-tungstenite WebSocket stream.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "WebSocket received close frame");
                    return None;
                }
                // Pong is handled automatically by tungstenite
                Ok(_) => continue,
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_appended_as_query_parameter() {
        let url = connect_url("ws://localhost:8080/ws", Some("a b&c")).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8080/ws?token=a+b%26c");
    }

    #[test]
    fn missing_or_empty_token_leaves_url_untouched() {
        let url = connect_url("ws://localhost:8080/ws", None).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8080/ws");
        let url = connect_url("ws://localhost:8080/ws", Some("")).unwrap();
        assert_eq!(url.query(), None);
    }

    #[test]
    fn unparseable_url_is_rejected() {
        assert!(matches!(
            connect_url("not a url", None),
            Err(TransportError::InvalidUrl { .. })
        ));
    }
}
