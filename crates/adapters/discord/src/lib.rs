//! Discord adapter for stackcord: a serenity gateway client that forwards guild messages as
//! [`DiscordEvent`]s and a small REST handle for sending, replying and editing.

use serenity::async_trait;
use serenity::builder::{CreateMessage, EditMessage};
use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::gateway::{GatewayIntents, Ready};
use serenity::model::id::{ChannelId, MessageId};
use serenity::prelude::{Context, EventHandler};
use serenity::Client;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use serenity::Error;

/// One message seen on the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscordEvent {
    pub channel_id: u64,
    /// Channel name without the leading `#`; falls back to the id when the name is unavailable.
    pub channel_name: String,
    pub author_id: u64,
    /// Guild nickname when set, otherwise the global display name or user name.
    pub author_name: String,
    pub author_is_bot: bool,
    pub content: String,
    pub message_id: u64,
}

struct Handler {
    events: mpsc::Sender<DiscordEvent>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        log::info!("discord connected as {}", ready.user.name);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let channel_name = match msg.channel_id.name(&ctx).await {
            Ok(name) => name,
            Err(e) => {
                log::debug!("discord channel {} has no name: {}", msg.channel_id, e);
                msg.channel_id.to_string()
            }
        };
        let author_name = match msg.author_nick(&ctx).await {
            Some(nick) => nick,
            None => msg
                .author
                .global_name
                .clone()
                .unwrap_or_else(|| msg.author.name.clone()),
        };
        let event = DiscordEvent {
            channel_id: msg.channel_id.get(),
            channel_name,
            author_id: msg.author.id.get(),
            author_name,
            author_is_bot: msg.author.bot,
            content: msg.content.clone(),
            message_id: msg.id.get(),
        };
        if self.events.send(event).await.is_err() {
            log::warn!("discord event receiver dropped");
        }
    }
}

/// REST handle for outbound calls. Cheap to clone.
#[derive(Clone)]
pub struct DiscordClient {
    http: Arc<Http>,
}

impl DiscordClient {
    pub async fn send(&self, channel_id: u64, text: &str) -> Result<u64, Error> {
        let sent = ChannelId::new(channel_id)
            .send_message(self.http.as_ref(), CreateMessage::new().content(text))
            .await?;
        Ok(sent.id.get())
    }

    /// Send `text` as a native reply to `in_reply_to`.
    pub async fn reply(&self, channel_id: u64, text: &str, in_reply_to: u64) -> Result<u64, Error> {
        let channel = ChannelId::new(channel_id);
        let builder = CreateMessage::new()
            .content(text)
            .reference_message((channel, MessageId::new(in_reply_to)));
        let sent = channel.send_message(self.http.as_ref(), builder).await?;
        Ok(sent.id.get())
    }

    pub async fn edit(&self, channel_id: u64, message_id: u64, text: &str) -> Result<(), Error> {
        ChannelId::new(channel_id)
            .edit_message(
                self.http.as_ref(),
                MessageId::new(message_id),
                EditMessage::new().content(text),
            )
            .await?;
        Ok(())
    }
}

/// Connect to the Discord gateway. Events go to `events` until the returned task ends.
pub async fn connect(
    token: &str,
    events: mpsc::Sender<DiscordEvent>,
) -> Result<(DiscordClient, JoinHandle<()>), Error> {
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;
    let mut client = Client::builder(token, intents)
        .event_handler(Handler { events })
        .await?;
    let http = client.http.clone();
    let handle = tokio::spawn(async move {
        if let Err(e) = client.start().await {
            log::error!("discord gateway stopped: {}", e);
        }
    });
    Ok((DiscordClient { http }, handle))
}
