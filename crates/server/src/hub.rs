//! The chat hub: the single point where room events are accepted.
//!
//! Socket tasks never touch the [`RoomRegistry`] directly. They post
//! [`HubCommand`]s to one queue, and the hub task applies them one at a time.
//! Because acceptance and fan-out of an event happen inside one `apply` call,
//! and each member's outbound queue is FIFO, every member of a room observes
//! that room's events in the order the hub accepted them.

use channelchat_shared::{ChannelId, ChatMessage, ClientCommand, ServerEvent, SessionId, UserSummary};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};

use crate::dispatcher::broadcast_to_room;
use crate::presence;
use crate::registry::{JoinOutcome, Outbound, RoomRegistry, Session};

/// First id handed out to a chat message.
const FIRST_MESSAGE_ID: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("chat hub is not running")]
    Unavailable,
}

/// Work item for the hub task.
#[derive(Debug)]
pub enum HubCommand {
    Connect {
        session_id: SessionId,
        outbound: Outbound,
    },
    Client {
        session_id: SessionId,
        command: ClientCommand,
    },
    Disconnect {
        session_id: SessionId,
        done: oneshot::Sender<()>,
    },
    Participants {
        channel_id: ChannelId,
        reply: oneshot::Sender<Vec<UserSummary>>,
    },
}

/// Owner of the room registry and the message id sequence.
#[derive(Debug)]
pub struct Hub {
    registry: RoomRegistry,
    next_message_id: u64,
    max_message_len: usize,
}

impl Hub {
    pub fn new(max_message_len: usize) -> Self {
        Self {
            registry: RoomRegistry::new(),
            next_message_id: FIRST_MESSAGE_ID,
            max_message_len,
        }
    }

    /// Start numbering messages at `id` instead of 1.
    pub fn with_first_message_id(mut self, id: u64) -> Self {
        self.next_message_id = id;
        self
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Run the hub on its own task and return a handle to it.
    pub fn spawn(mut self) -> HubHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<HubCommand>();
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                self.apply(command);
            }
            tracing::debug!("Chat hub stopped");
        });
        HubHandle { tx }
    }

    pub fn apply(&mut self, command: HubCommand) {
        match command {
            HubCommand::Connect { session_id, outbound } => self.connect(session_id, outbound),
            HubCommand::Client { session_id, command } => self.handle_client(session_id, command),
            HubCommand::Disconnect { session_id, done } => {
                self.disconnect(session_id);
                let _ = done.send(());
            }
            HubCommand::Participants { channel_id, reply } => {
                let _ = reply.send(self.registry.participants(&channel_id));
            }
        }
    }

    pub fn connect(&mut self, session_id: SessionId, outbound: Outbound) {
        tracing::debug!(session_id = %session_id, "Session registered");
        self.registry.insert_session(Session::new(session_id, outbound));
    }

    pub fn handle_client(&mut self, session_id: SessionId, command: ClientCommand) {
        match command {
            ClientCommand::JoinChannel {
                channel_id,
                user_id,
                user_nickname,
            } => self.join(session_id, channel_id, user_id, user_nickname),
            ClientCommand::LeaveChannel { channel_id } => self.leave(session_id, &channel_id),
            ClientCommand::SendMessage { channel_id, message } => {
                self.send_message(session_id, &channel_id, message)
            }
            ClientCommand::Typing { channel_id } => self.typing(session_id, &channel_id),
            ClientCommand::Ping => self.reply(session_id, ServerEvent::Pong),
        }
    }

    fn join(
        &mut self,
        session_id: SessionId,
        channel_id: ChannelId,
        user_id: Option<String>,
        nickname: Option<String>,
    ) {
        let before = self.registry.session(session_id).map(Session::summary);
        if let Err(e) = self.registry.identify(session_id, user_id, nickname) {
            tracing::warn!(channel_id = %channel_id, "Join ignored: {}", e);
            return;
        }

        let outcome = match self.registry.join(session_id, &channel_id) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(channel_id = %channel_id, "Join ignored: {}", e);
                return;
            }
        };

        let Some(user) = self.registry.session(session_id).map(Session::summary) else {
            return;
        };

        match outcome {
            JoinOutcome::Joined { previous } => {
                if let Some(previous) = previous {
                    tracing::info!(session_id = %session_id, channel_id = %previous, "Left channel");
                    presence::announce_left(&self.registry, &previous, &user);
                }
                tracing::info!(
                    session_id = %session_id,
                    channel_id = %channel_id,
                    nickname = %user.nickname,
                    "Joined channel"
                );
                presence::announce_joined(&self.registry, &channel_id, &user);
            }
            // Members key presence by session, so a fresh user_joined
            // replaces the stale identity.
            JoinOutcome::AlreadyMember if before.as_ref() != Some(&user) => {
                tracing::info!(
                    session_id = %session_id,
                    channel_id = %channel_id,
                    nickname = %user.nickname,
                    "Identity changed on repeated join"
                );
                presence::announce_joined(&self.registry, &channel_id, &user);
            }
            JoinOutcome::AlreadyMember => {
                tracing::debug!(session_id = %session_id, channel_id = %channel_id, "Repeated join");
            }
        }

        let participants = self.registry.participants(&channel_id);
        self.reply(
            session_id,
            ServerEvent::ChannelJoined {
                channel_id,
                participants,
            },
        );
    }

    fn leave(&mut self, session_id: SessionId, channel_id: &ChannelId) {
        if !self.registry.leave(session_id, channel_id) {
            return;
        }
        if let Some(user) = self.registry.session(session_id).map(Session::summary) {
            tracing::info!(session_id = %session_id, channel_id = %channel_id, "Left channel");
            presence::announce_left(&self.registry, channel_id, &user);
        }
    }

    fn send_message(&mut self, session_id: SessionId, channel_id: &ChannelId, body: String) {
        let Some(session) = self.registry.session(session_id) else {
            return;
        };

        if session.current_room() != Some(channel_id) {
            self.reply(
                session_id,
                ServerEvent::error(format!("not joined to channel {channel_id}")),
            );
            return;
        }

        let body = body.trim().to_string();
        if body.is_empty() {
            self.reply(session_id, ServerEvent::error("message body is empty"));
            return;
        }
        if body.chars().count() > self.max_message_len {
            self.reply(
                session_id,
                ServerEvent::error(format!(
                    "message exceeds {} characters",
                    self.max_message_len
                )),
            );
            return;
        }

        let message = ChatMessage {
            id: self.next_message_id,
            channel_id: channel_id.clone(),
            body,
            user: session.summary(),
            created_at: Utc::now(),
        };
        self.next_message_id += 1;

        tracing::debug!(
            session_id = %session_id,
            channel_id = %channel_id,
            message_id = message.id,
            "Accepted chat message"
        );

        let event = ServerEvent::NewMessage {
            channel_id: channel_id.clone(),
            message,
        };
        broadcast_to_room(&self.registry, channel_id, &event, None);
    }

    fn typing(&mut self, session_id: SessionId, channel_id: &ChannelId) {
        if !self.registry.is_member(session_id, channel_id) {
            self.reply(
                session_id,
                ServerEvent::error(format!("not joined to channel {channel_id}")),
            );
            return;
        }
        presence::relay_typing(&self.registry, channel_id, session_id);
    }

    pub fn disconnect(&mut self, session_id: SessionId) {
        let Some((session, room)) = self.registry.on_disconnect(session_id) else {
            return;
        };
        if let Some(channel_id) = room {
            tracing::info!(session_id = %session_id, channel_id = %channel_id, "Left channel on disconnect");
            presence::announce_left(&self.registry, &channel_id, &session.summary());
        }
        tracing::debug!(session_id = %session_id, "Session deregistered");
    }

    /// Send an event to one session only.
    fn reply(&self, session_id: SessionId, event: ServerEvent) {
        if let Some(session) = self.registry.session(session_id) {
            if let Err(e) = session.deliver(event) {
                tracing::debug!("Dropped reply: {}", e);
            }
        }
    }
}

/// Cloneable sender side of a running hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    fn post(&self, command: HubCommand) -> Result<(), HubError> {
        self.tx.send(command).map_err(|_| HubError::Unavailable)
    }

    pub fn connect(&self, session_id: SessionId, outbound: Outbound) -> Result<(), HubError> {
        self.post(HubCommand::Connect { session_id, outbound })
    }

    pub fn dispatch(&self, session_id: SessionId, command: ClientCommand) -> Result<(), HubError> {
        self.post(HubCommand::Client { session_id, command })
    }

    /// Deregister a session and wait until its room has been told.
    pub async fn disconnect(&self, session_id: SessionId) -> Result<(), HubError> {
        let (done, wait) = oneshot::channel();
        self.post(HubCommand::Disconnect { session_id, done })?;
        wait.await.map_err(|_| HubError::Unavailable)
    }

    pub async fn participants(&self, channel_id: ChannelId) -> Result<Vec<UserSummary>, HubError> {
        let (reply, wait) = oneshot::channel();
        self.post(HubCommand::Participants { channel_id, reply })?;
        wait.await.map_err(|_| HubError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Client {
        id: SessionId,
        rx: mpsc::UnboundedReceiver<ServerEvent>,
    }

    impl Client {
        fn connect(hub: &mut Hub) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let id = SessionId::new();
            hub.connect(id, tx);
            Self { id, rx }
        }

        fn drain(&mut self) -> Vec<ServerEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.rx.try_recv() {
                events.push(event);
            }
            events
        }
    }

    fn join(hub: &mut Hub, client: &Client, channel: u64, nickname: &str) {
        hub.handle_client(
            client.id,
            ClientCommand::JoinChannel {
                channel_id: ChannelId::from(channel),
                user_id: None,
                user_nickname: Some(nickname.to_string()),
            },
        );
    }

    fn say(hub: &mut Hub, client: &Client, channel: u64, text: &str) {
        hub.handle_client(
            client.id,
            ClientCommand::SendMessage {
                channel_id: ChannelId::from(channel),
                message: text.to_string(),
            },
        );
    }

    fn messages(events: &[ServerEvent]) -> Vec<(u64, String)> {
        events
            .iter()
            .filter_map(|event| match event {
                ServerEvent::NewMessage { message, .. } => Some((message.id, message.body.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn message_is_numbered_and_echoed_to_sender() {
        let mut hub = Hub::new(2000).with_first_message_id(1001);
        let mut alice = Client::connect(&mut hub);
        join(&mut hub, &alice, 42, "alice");
        alice.drain();

        say(&mut hub, &alice, 42, "hello");

        let events = alice.drain();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ServerEvent::NewMessage { channel_id, message } => {
                assert_eq!(channel_id, &ChannelId::from(42));
                assert_eq!(message.id, 1001);
                assert_eq!(message.body, "hello");
                assert_eq!(message.user.nickname, "alice");
                assert_eq!(message.user.session_id, alice.id);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rooms_are_isolated() {
        let mut hub = Hub::new(2000);
        let mut a = Client::connect(&mut hub);
        let mut b = Client::connect(&mut hub);
        join(&mut hub, &a, 1, "a");
        join(&mut hub, &b, 2, "b");
        a.drain();
        b.drain();

        say(&mut hub, &b, 2, "only for room two");

        assert!(a.drain().is_empty());
        assert_eq!(messages(&b.drain()).len(), 1);
    }

    #[test]
    fn members_see_messages_in_acceptance_order() {
        let mut hub = Hub::new(2000);
        let mut clients: Vec<Client> = (0..3).map(|_| Client::connect(&mut hub)).collect();
        for (i, client) in clients.iter().enumerate() {
            join(&mut hub, client, 7, &format!("user{i}"));
        }
        for client in &mut clients {
            client.drain();
        }

        for round in 0..5 {
            for (i, client) in clients.iter().enumerate() {
                say(&mut hub, client, 7, &format!("{round}-{i}"));
            }
        }

        let expected: Vec<u64> = (1..=15).collect();
        for client in &mut clients {
            let ids: Vec<u64> = messages(&client.drain()).into_iter().map(|(id, _)| id).collect();
            assert_eq!(ids, expected);
        }
    }

    #[test]
    fn join_announces_presence_to_others_and_lists_participants_to_joiner() {
        let mut hub = Hub::new(2000);
        let mut a = Client::connect(&mut hub);
        let mut b = Client::connect(&mut hub);
        join(&mut hub, &a, 7, "a");
        a.drain();

        join(&mut hub, &b, 7, "b");

        let a_events = a.drain();
        assert!(matches!(
            &a_events[..],
            [ServerEvent::UserJoined { user, .. }] if user.session_id == b.id
        ));
        let b_events = b.drain();
        match &b_events[..] {
            [ServerEvent::ChannelJoined { participants, .. }] => {
                let names: Vec<&str> = participants.iter().map(|p| p.nickname.as_str()).collect();
                assert_eq!(names, vec!["a", "b"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn switching_rooms_announces_leave_to_old_room() {
        let mut hub = Hub::new(2000);
        let mut a = Client::connect(&mut hub);
        let b = Client::connect(&mut hub);
        join(&mut hub, &a, 1, "a");
        join(&mut hub, &b, 1, "b");
        a.drain();

        join(&mut hub, &b, 2, "b");

        assert!(matches!(
            &a.drain()[..],
            [ServerEvent::UserLeft { channel_id, user }]
                if channel_id == &ChannelId::from(1) && user.session_id == b.id
        ));
        hub.registry().assert_consistent();
    }

    #[test]
    fn repeated_join_is_not_reannounced() {
        let mut hub = Hub::new(2000);
        let mut a = Client::connect(&mut hub);
        let mut b = Client::connect(&mut hub);
        join(&mut hub, &a, 3, "a");
        join(&mut hub, &b, 3, "b");
        a.drain();
        b.drain();

        join(&mut hub, &b, 3, "b");

        assert!(a.drain().is_empty());
        assert!(matches!(&b.drain()[..], [ServerEvent::ChannelJoined { .. }]));
    }

    #[test]
    fn repeated_join_with_new_nickname_is_announced() {
        let mut hub = Hub::new(2000);
        let mut a = Client::connect(&mut hub);
        let mut b = Client::connect(&mut hub);
        join(&mut hub, &a, 3, "a");
        join(&mut hub, &b, 3, "b");
        a.drain();
        b.drain();

        join(&mut hub, &b, 3, "bee");

        assert!(matches!(
            &a.drain()[..],
            [ServerEvent::UserJoined { user, .. }] if user.session_id == b.id && user.nickname == "bee"
        ));
        match &b.drain()[..] {
            [ServerEvent::ChannelJoined { participants, .. }] => {
                let names: Vec<&str> = participants.iter().map(|p| p.nickname.as_str()).collect();
                assert_eq!(names, vec!["a", "bee"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn disconnect_announces_leave_and_clears_membership() {
        let mut hub = Hub::new(2000);
        let mut a = Client::connect(&mut hub);
        let b = Client::connect(&mut hub);
        join(&mut hub, &a, 7, "a");
        join(&mut hub, &b, 7, "b");
        a.drain();

        hub.disconnect(b.id);
        hub.disconnect(b.id);

        assert!(matches!(
            &a.drain()[..],
            [ServerEvent::UserLeft { user, .. }] if user.session_id == b.id
        ));
        assert_eq!(hub.registry().participants(&ChannelId::from(7)).len(), 1);
        hub.registry().assert_consistent();
    }

    #[test]
    fn send_to_a_channel_not_joined_is_rejected_to_sender_only() {
        let mut hub = Hub::new(2000);
        let mut a = Client::connect(&mut hub);
        let mut b = Client::connect(&mut hub);
        join(&mut hub, &a, 1, "a");
        join(&mut hub, &b, 2, "b");
        a.drain();
        b.drain();

        say(&mut hub, &a, 2, "sneaky");

        assert!(matches!(&a.drain()[..], [ServerEvent::Error(_)]));
        assert!(b.drain().is_empty());
    }

    #[test]
    fn blank_and_oversized_bodies_are_rejected() {
        let mut hub = Hub::new(5);
        let mut a = Client::connect(&mut hub);
        join(&mut hub, &a, 1, "a");
        a.drain();

        say(&mut hub, &a, 1, "   ");
        say(&mut hub, &a, 1, "too long");
        say(&mut hub, &a, 1, "ok");

        let events = a.drain();
        assert!(matches!(events[0], ServerEvent::Error(_)));
        assert!(matches!(events[1], ServerEvent::Error(_)));
        assert_eq!(messages(&events), vec![(1, "ok".to_string())]);
    }

    #[test]
    fn typing_requires_membership() {
        let mut hub = Hub::new(2000);
        let mut a = Client::connect(&mut hub);
        join(&mut hub, &a, 1, "a");
        a.drain();

        hub.handle_client(a.id, ClientCommand::Typing { channel_id: ChannelId::from(2) });
        assert!(matches!(&a.drain()[..], [ServerEvent::Error(_)]));
    }

    #[test]
    fn explicit_leave_is_idempotent() {
        let mut hub = Hub::new(2000);
        let mut a = Client::connect(&mut hub);
        let b = Client::connect(&mut hub);
        join(&mut hub, &a, 4, "a");
        join(&mut hub, &b, 4, "b");
        a.drain();

        for _ in 0..2 {
            hub.handle_client(b.id, ClientCommand::LeaveChannel { channel_id: ChannelId::from(4) });
        }

        assert_eq!(a.drain().len(), 1);
        assert!(hub.registry().session(b.id).unwrap().current_room().is_none());
        hub.registry().assert_consistent();
    }

    #[tokio::test]
    async fn handle_round_trips_through_the_hub_task() {
        let handle = Hub::new(2000).spawn();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = SessionId::new();
        handle.connect(id, tx).unwrap();
        handle
            .dispatch(
                id,
                ClientCommand::JoinChannel {
                    channel_id: ChannelId::from(8),
                    user_id: Some("77".to_string()),
                    user_nickname: Some("yoon".to_string()),
                },
            )
            .unwrap();

        let participants = handle.participants(ChannelId::from(8)).await.unwrap();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].id.as_deref(), Some("77"));
        assert!(matches!(rx.recv().await, Some(ServerEvent::ChannelJoined { .. })));

        handle.disconnect(id).await.unwrap();
        assert!(handle.participants(ChannelId::from(8)).await.unwrap().is_empty());
    }
}
