//! WebSocket endpoint for the real-time channel chat.
//!
//! Each connection runs a reader loop that multiplexes inbound frames with
//! the liveness check timer, and a writer task that drains the events the hub
//! queued for this session. When either ends the connection, the session is
//! deregistered from the hub before the handler returns, so no broadcast
//! targets a socket that is already gone.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use channelchat_shared::{ClientCommand, ServerEvent, SessionId};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::heartbeat::Liveness;
use crate::hub::HubHandle;
use crate::state::AppState;

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Opaque credential issued by the session service. Verification belongs
    /// to that service; the chat layer only records whether one was sent.
    pub token: Option<String>,
}

/// Why a session's socket task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    ClientClosed,
    SocketError,
    HeartbeatTimeout,
    HubStopped,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let authenticated = params.token.is_some_and(|t| !t.is_empty());
    ws.on_upgrade(move |socket| handle_socket(socket, state, authenticated))
}

/// Drive one client connection until it closes or goes silent.
async fn handle_socket(socket: WebSocket, state: AppState, authenticated: bool) {
    let session_id = SessionId::new();
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerEvent>();

    if state.hub.connect(session_id, outbound_tx.clone()).is_err() {
        tracing::error!(session_id = %session_id, "Chat hub unavailable, refusing connection");
        let _ = sender.close().await;
        return;
    }

    tracing::info!(session_id = %session_id, authenticated, "WebSocket session opened");

    let _ = outbound_tx.send(ServerEvent::connection_ack(session_id));

    let heartbeat = state.config.heartbeat;
    let mut liveness = Liveness::new(Instant::now(), heartbeat.grace);
    let mut liveness_check = interval_at(Instant::now() + heartbeat.interval, heartbeat.interval);
    liveness_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Writes run on their own task so a peer that stops reading cannot
    // stall the liveness check below.
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let json = match event.encode() {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(session_id = %session_id, "Failed to encode {}: {}", event.name(), e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                return;
            }
        }
        let _ = sender.close().await;
    });

    let reason = loop {
        tokio::select! {
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        liveness.touch(Instant::now());
                        if handle_frame(text.as_str(), session_id, &state.hub, &outbound_tx).is_err() {
                            break CloseReason::HubStopped;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break CloseReason::ClientClosed,
                    Some(Ok(_)) => liveness.touch(Instant::now()),
                    Some(Err(e)) => {
                        tracing::debug!(session_id = %session_id, "WebSocket receive error: {}", e);
                        break CloseReason::SocketError;
                    }
                }
            }

            _ = &mut send_task => break CloseReason::SocketError,

            _ = liveness_check.tick() => {
                let now = Instant::now();
                if liveness.is_expired(now) {
                    tracing::info!(
                        session_id = %session_id,
                        silent_ms = liveness.silence(now).as_millis() as u64,
                        "Heartbeat grace elapsed, closing session"
                    );
                    break CloseReason::HeartbeatTimeout;
                }
            }
        }
    };

    if let Err(e) = state.hub.disconnect(session_id).await {
        tracing::warn!(session_id = %session_id, "Could not deregister session: {}", e);
    }

    // With the hub's sender gone, a healthy writer flushes what is queued and
    // closes the socket. A stuck one is cut off after one interval.
    drop(outbound_tx);
    if !send_task.is_finished() {
        let flushed = matches!(reason, CloseReason::ClientClosed | CloseReason::HubStopped)
            && tokio::time::timeout(heartbeat.interval, &mut send_task).await.is_ok();
        if !flushed {
            send_task.abort();
        }
    }

    tracing::info!(session_id = %session_id, reason = ?reason, "WebSocket session closed");
}

/// Decode one inbound frame and route it. Malformed frames are answered with
/// an `error` event to this session only. Fails only when the hub is gone.
fn handle_frame(
    text: &str,
    session_id: SessionId,
    hub: &HubHandle,
    outbound: &mpsc::UnboundedSender<ServerEvent>,
) -> Result<(), crate::hub::HubError> {
    let command = match ClientCommand::decode(text) {
        Ok(command) => command,
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "Discarding malformed event");
            let _ = outbound.send(ServerEvent::error(e.to_string()));
            return Ok(());
        }
    };

    match command {
        ClientCommand::Ping => {
            let _ = outbound.send(ServerEvent::Pong);
            Ok(())
        }
        command => {
            tracing::debug!(session_id = %session_id, event = command.name(), "Inbound event");
            hub.dispatch(session_id, command)
        }
    }
}
