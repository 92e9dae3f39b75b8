//! Terminal chat client.
//!
//! Joins `CHANNELCHAT_CHANNEL` and sends each stdin line as a chat message.
//! `/typing` sends a typing indicator, `/who` lists the room, `/quit` leaves.

use std::sync::{Arc, Mutex};

use channelchat_client::stores::{ChannelPresence, MessageStore};
use channelchat_client::{ApiClient, ChatClient, ChatProfile, ClientConfig, WsConnector};
use channelchat_shared::{ChatMessage, ServerEvent, ServerEventKind};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "channelchat_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ClientConfig::from_env();
    let profile = ChatProfile::from_env();
    let Some(channel) = profile.channel.clone() else {
        anyhow::bail!("CHANNELCHAT_CHANNEL must name the channel to join");
    };

    let mut store = MessageStore::new();
    if let Some(api_url) = &config.api_url {
        let api = ApiClient::new()
            .with_base_url(api_url.as_str())
            .with_auth_token(config.auth_token.clone());
        match api.messages(&channel, None).await {
            Ok(page) => {
                let history = store.channel_mut(&channel);
                history.set_history(page.items);
                history.messages.iter().for_each(print_message);
            }
            Err(e) => tracing::warn!("Could not load history: {}", e),
        }
    }

    tracing::info!(url = %config.server_url, channel = %channel, "Opening chat session");
    let client = ChatClient::open(config, WsConnector::new());

    client.on_event(ServerEventKind::NewMessage, move |event| {
        if store.apply(event) {
            if let ServerEvent::NewMessage { message, .. } = event {
                print_message(message);
            }
        }
    });

    let presence = Arc::new(Mutex::new(ChannelPresence::new(channel.clone())));
    for kind in [
        ServerEventKind::ChannelJoined,
        ServerEventKind::UserJoined,
        ServerEventKind::UserLeft,
    ] {
        let presence = Arc::clone(&presence);
        client.on_event(kind, move |event| {
            if let Ok(mut presence) = presence.lock() {
                presence.apply(event);
            }
            match event {
                ServerEvent::UserJoined { user, .. } => println!("* {} joined", user.nickname),
                ServerEvent::UserLeft { user, .. } => println!("* {} left", user.nickname),
                ServerEvent::ChannelJoined { channel_id, participants } => {
                    println!("* joined #{} ({} here)", channel_id, participants.len())
                }
                _ => {}
            }
        });
    }
    client.on_event(ServerEventKind::UserTyping, |event| {
        if let ServerEvent::UserTyping { user, .. } = event {
            println!("* {} is typing...", user.nickname);
        }
    });
    client.on_event(ServerEventKind::Error, |event| {
        if let ServerEvent::Error(reason) = event {
            eprintln!("! server: {reason}");
        }
    });
    client.on_error(|error| eprintln!("! {error}"));

    client.join_channel(channel.clone(), profile.user_id.clone(), profile.nickname.clone())?;

    let mut status = client.status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let state = status.borrow_and_update().clone();
            tracing::info!(?state, "Connection state");
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/typing" => {
                let _ = client.typing(channel.clone());
            }
            "/who" => {
                if let Ok(presence) = presence.lock() {
                    println!("* {} here: {}", presence.count(), presence.nicknames().join(", "));
                }
            }
            // Rejections are reported through the error handler.
            text => {
                let _ = client.send_message(channel.clone(), text);
            }
        }
    }

    client.close().await;
    Ok(())
}

fn print_message(message: &ChatMessage) {
    println!(
        "[{}] {}: {}",
        message.created_at.format("%H:%M:%S"),
        message.user.nickname,
        message.body
    );
}
