//! Chat session with heartbeat and auto-reconnect.
//!
//! [`ChatClient`] is a cheap handle; all work happens on one driver task
//! spawned by [`ChatClient::open`]. The driver owns the transport, the
//! handler tables, the heartbeat monitor and the reconnect counter, and
//! multiplexes user commands, inbound frames, the ping timer and heartbeat
//! checks with `select!`, so none of them ever runs concurrently with another.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use channelchat_shared::{ChannelId, ClientCommand, ServerEvent, ServerEventKind};
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_channel::oneshot;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::time::{interval_at, sleep, sleep_until, timeout, Instant, MissedTickBehavior};

use super::heartbeat::{HeartbeatMonitor, Liveness};
use super::reconnect::{ConnectionState, ReconnectController, RetryDecision};
use super::transport::{Connector, Transport, TransportError};
use crate::config::ClientConfig;

pub type EventHandler = Box<dyn FnMut(&ServerEvent) + Send>;
pub type ErrorHandler = Box<dyn FnMut(&SessionError) + Send>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("cannot send {event}: not connected ({state:?})")]
    NotConnected {
        event: &'static str,
        state: ConnectionState,
    },
    #[error("connection lost after {attempts} reconnect attempts, please reload")]
    ReconnectExhausted { attempts: u32 },
    #[error("session is closed")]
    Closed,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("unreadable server event: {0}")]
    Protocol(String),
}

enum Command {
    Send(ClientCommand),
    Join(ClientCommand),
    OnEvent(ServerEventKind, EventHandler),
    OnError(ErrorHandler),
    ReportError(SessionError),
    Forget(ChannelId),
    Close(oneshot::Sender<()>),
}

/// Handle to a running chat session.
pub struct ChatClient {
    commands: UnboundedSender<Command>,
    status: watch::Receiver<ConnectionState>,
}

impl ChatClient {
    /// Start connecting in the background. Completion is observed through
    /// [`ChatClient::status`], never through a return value.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: ClientConfig, connector: impl Connector + 'static) -> Self {
        let (commands, inbox) = unbounded();
        let (status_tx, status) = watch::channel(ConnectionState::Disconnected);

        let driver = Driver {
            heartbeat: HeartbeatMonitor::new(config.heartbeat_grace),
            reconnect: ReconnectController::new(config.reconnect.clone()),
            config,
            connector: Arc::new(connector),
            inbox,
            status: status_tx,
            handlers: HashMap::new(),
            error_handlers: Vec::new(),
            join: None,
        };
        tokio::spawn(driver.run());

        Self { commands, status }
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().clone()
    }

    /// Watch connection state transitions.
    pub fn status(&self) -> watch::Receiver<ConnectionState> {
        self.status.clone()
    }

    /// Queue an event for the server.
    ///
    /// `join_channel` is always accepted: it becomes the room the session
    /// re-joins after every (re)connect, and goes out immediately if
    /// connected. Anything else is rejected unless the session is currently
    /// connected; the rejection is also reported to the error handlers.
    pub fn send(&self, command: ClientCommand) -> Result<(), SessionError> {
        if self.commands.is_closed() {
            return Err(SessionError::Closed);
        }

        if matches!(command, ClientCommand::JoinChannel { .. }) {
            return self.push(Command::Join(command));
        }

        let state = self.state();
        if !state.is_connected() {
            let error = SessionError::NotConnected {
                event: command.name(),
                state,
            };
            // A leave still stops the room from being re-joined later.
            if let ClientCommand::LeaveChannel { channel_id } = &command {
                let _ = self.push(Command::Forget(channel_id.clone()));
            }
            let _ = self.push(Command::ReportError(error.clone()));
            return Err(error);
        }
        self.push(Command::Send(command))
    }

    pub fn join_channel(
        &self,
        channel_id: ChannelId,
        user_id: Option<String>,
        user_nickname: Option<String>,
    ) -> Result<(), SessionError> {
        self.send(ClientCommand::JoinChannel {
            channel_id,
            user_id,
            user_nickname,
        })
    }

    pub fn send_message(&self, channel_id: ChannelId, message: impl Into<String>) -> Result<(), SessionError> {
        self.send(ClientCommand::SendMessage {
            channel_id,
            message: message.into(),
        })
    }

    pub fn typing(&self, channel_id: ChannelId) -> Result<(), SessionError> {
        self.send(ClientCommand::Typing { channel_id })
    }

    /// Register a handler for one kind of server event. Handlers run on the
    /// session task, in arrival order, and every handler of a kind runs.
    pub fn on_event(&self, kind: ServerEventKind, handler: impl FnMut(&ServerEvent) + Send + 'static) {
        let _ = self.push(Command::OnEvent(kind, Box::new(handler)));
    }

    pub fn on_error(&self, handler: impl FnMut(&SessionError) + Send + 'static) {
        let _ = self.push(Command::OnError(Box::new(handler)));
    }

    /// Leave the current room, close the transport and stop retrying.
    /// Returns once teardown is complete; safe to call more than once.
    pub async fn close(&self) {
        let (done, finished) = oneshot::channel();
        if self.push(Command::Close(done)).is_err() {
            return;
        }
        let _ = finished.await;
    }

    fn push(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .unbounded_send(command)
            .map_err(|_| SessionError::Closed)
    }
}

/// How a connected phase ended.
enum Exit {
    Lost(String),
    Closed(Option<oneshot::Sender<()>>),
}

/// Outcome of waiting while not connected.
enum Wait<T> {
    Done(T),
    Closed(Option<oneshot::Sender<()>>),
}

struct Driver {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    inbox: UnboundedReceiver<Command>,
    status: watch::Sender<ConnectionState>,
    handlers: HashMap<ServerEventKind, Vec<EventHandler>>,
    error_handlers: Vec<ErrorHandler>,
    /// The `join_channel` replayed after every connect.
    join: Option<ClientCommand>,
    heartbeat: HeartbeatMonitor,
    reconnect: ReconnectController,
}

impl Driver {
    async fn run(mut self) {
        let ack = loop {
            let attempt = self.reconnect.attempt();
            self.set_state(if attempt == 0 {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting { attempt }
            });

            let connector = Arc::clone(&self.connector);
            let url = self.config.server_url.clone();
            let token = self.config.auth_token.clone();
            let connect_timeout = self.config.connect_timeout;
            let connecting = async move {
                match timeout(connect_timeout, connector.connect(&url, token.as_deref())).await {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Connect(format!(
                        "timed out after {}s",
                        connect_timeout.as_secs()
                    ))),
                }
            };

            let failure = match self.wait(connecting).await {
                Wait::Closed(ack) => break ack,
                Wait::Done(Ok(transport)) => {
                    self.reconnect.on_connected();
                    match self.run_connected(transport).await {
                        Exit::Closed(ack) => break ack,
                        Exit::Lost(reason) => reason,
                    }
                }
                Wait::Done(Err(e)) => e.to_string(),
            };
            tracing::warn!(url = %self.config.server_url, "Chat connection unavailable: {}", failure);

            match self.reconnect.on_failure() {
                RetryDecision::RetryAfter { attempt, delay } => {
                    tracing::info!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnecting to {}",
                        self.config.server_url
                    );
                    self.set_state(ConnectionState::Reconnecting { attempt });
                    if let Wait::Closed(ack) = self.wait(sleep(delay)).await {
                        break ack;
                    }
                }
                RetryDecision::GiveUp { attempts } => {
                    tracing::error!(attempts, "Max reconnect attempts exceeded, giving up");
                    self.set_state(ConnectionState::Failed {
                        reason: format!("Max reconnect attempts ({attempts}) exceeded"),
                    });
                    self.report(SessionError::ReconnectExhausted { attempts });
                    break self.idle().await;
                }
            }
        };

        self.heartbeat.stop();
        self.set_state(ConnectionState::Disconnected);
        tracing::debug!("Chat session closed");
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    /// Drive `future` to completion while still serving commands.
    async fn wait<F: Future>(&mut self, future: F) -> Wait<F::Output> {
        tokio::pin!(future);
        loop {
            tokio::select! {
                biased;
                command = self.inbox.next() => match command {
                    Some(Command::Close(ack)) => return Wait::Closed(Some(ack)),
                    None => return Wait::Closed(None),
                    Some(command) => self.handle_offline(command),
                },
                output = &mut future => return Wait::Done(output),
            }
        }
    }

    /// Park in `Failed` until the owner closes the session.
    async fn idle(&mut self) -> Option<oneshot::Sender<()>> {
        loop {
            match self.inbox.next().await {
                Some(Command::Close(ack)) => return Some(ack),
                None => return None,
                Some(command) => self.handle_offline(command),
            }
        }
    }

    fn handle_offline(&mut self, command: Command) {
        match command {
            Command::Join(join) => self.join = Some(join),
            Command::Send(command) => {
                if let ClientCommand::LeaveChannel { channel_id } = &command {
                    self.forget_room(channel_id);
                }
                let state = self.status.borrow().clone();
                self.report(SessionError::NotConnected {
                    event: command.name(),
                    state,
                });
            }
            other => self.register(other),
        }
    }

    fn register(&mut self, command: Command) {
        match command {
            Command::OnEvent(kind, handler) => self.handlers.entry(kind).or_default().push(handler),
            Command::OnError(handler) => self.error_handlers.push(handler),
            Command::ReportError(error) => self.report(error),
            Command::Forget(channel_id) => self.forget_room(&channel_id),
            Command::Send(_) | Command::Join(_) | Command::Close(_) => {}
        }
    }

    async fn run_connected(&mut self, mut transport: Box<dyn Transport>) -> Exit {
        self.set_state(ConnectionState::Connected);
        tracing::info!(url = %self.config.server_url, "Chat connected");

        let now = Instant::now();
        self.heartbeat.start(now);
        let period = self.config.ping_interval;
        let mut ping = interval_at(now + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The server forgets membership with the old connection.
        if let Some(join) = self.join.clone() {
            tracing::debug!(event = join.name(), "Re-joining channel");
            if let Err(e) = transmit(transport.as_mut(), &join).await {
                return self.lose(transport, e.to_string()).await;
            }
        }

        loop {
            let next_check = self.heartbeat.next_check();
            tokio::select! {
                biased;
                command = self.inbox.next() => {
                    let outgoing = match command {
                        Some(Command::Close(ack)) => {
                            self.shutdown(transport.as_mut()).await;
                            return Exit::Closed(Some(ack));
                        }
                        None => {
                            self.shutdown(transport.as_mut()).await;
                            return Exit::Closed(None);
                        }
                        Some(Command::Join(join)) => {
                            self.join = Some(join.clone());
                            join
                        }
                        Some(Command::Send(command)) => {
                            if let ClientCommand::LeaveChannel { channel_id } = &command {
                                self.forget_room(channel_id);
                            }
                            command
                        }
                        Some(other) => {
                            self.register(other);
                            continue;
                        }
                    };
                    if let Err(e) = transmit(transport.as_mut(), &outgoing).await {
                        return self.lose(transport, e.to_string()).await;
                    }
                }

                frame = transport.recv() => match frame {
                    Some(Ok(text)) => self.dispatch(&text),
                    Some(Err(e)) => return self.lose(transport, e.to_string()).await,
                    None => return self.lose(transport, "server closed the connection".to_string()).await,
                },

                _ = ping.tick() => {
                    if let Err(e) = transmit(transport.as_mut(), &ClientCommand::Ping).await {
                        return self.lose(transport, e.to_string()).await;
                    }
                    self.heartbeat.on_ping_sent(Instant::now());
                }

                _ = deadline(next_check) => {
                    if let Liveness::Dead { silent_for } = self.heartbeat.check(Instant::now()) {
                        tracing::warn!(
                            silent_ms = silent_for.as_millis() as u64,
                            "No pong within heartbeat grace, dropping connection"
                        );
                        return self.lose(transport, "heartbeat timeout".to_string()).await;
                    }
                }
            }
        }
    }

    fn dispatch(&mut self, text: &str) {
        let event = match ServerEvent::decode(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Failed to parse server event: {}", e);
                self.report(SessionError::Protocol(e.to_string()));
                return;
            }
        };

        if event == ServerEvent::Pong {
            self.heartbeat.on_pong(Instant::now());
        }
        if let ServerEvent::Error(message) = &event {
            tracing::warn!("Server rejected a request: {}", message);
        }

        if let Some(handlers) = self.handlers.get_mut(&event.kind()) {
            for handler in handlers.iter_mut() {
                handler(&event);
            }
        }
    }

    fn report(&mut self, error: SessionError) {
        tracing::debug!("Session error: {}", error);
        for handler in self.error_handlers.iter_mut() {
            handler(&error);
        }
    }

    fn forget_room(&mut self, channel_id: &ChannelId) {
        if matches!(&self.join, Some(ClientCommand::JoinChannel { channel_id: joined, .. }) if joined == channel_id) {
            self.join = None;
        }
    }

    fn current_room(&self) -> Option<ChannelId> {
        match &self.join {
            Some(ClientCommand::JoinChannel { channel_id, .. }) => Some(channel_id.clone()),
            _ => None,
        }
    }

    /// Best-effort leave, then close the transport and stop the heartbeat.
    async fn shutdown(&mut self, transport: &mut dyn Transport) {
        if let Some(channel_id) = self.current_room() {
            let leave = ClientCommand::LeaveChannel { channel_id };
            if let Err(e) = transmit(transport, &leave).await {
                tracing::debug!("Could not send leave_channel during close: {}", e);
            }
        }
        if let Err(e) = transport.close().await {
            tracing::debug!("Transport close failed: {}", e);
        }
        self.heartbeat.stop();
    }

    async fn lose(&mut self, mut transport: Box<dyn Transport>, reason: String) -> Exit {
        self.heartbeat.stop();
        let _ = transport.close().await;
        self.set_state(ConnectionState::Disconnected);
        Exit::Lost(reason)
    }

    fn set_state(&self, state: ConnectionState) {
        self.status.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::debug!(from = ?current, to = ?state, "Connection state changed");
            *current = state;
            true
        });
    }
}

async fn transmit(transport: &mut dyn Transport, command: &ClientCommand) -> Result<(), TransportError> {
    let json = command
        .encode()
        .map_err(|e| TransportError::Send(e.to_string()))?;
    transport.send(json).await
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
