//! Discord transport on top of the `discord-channel` adapter crate.

use crate::channels::inbound::{InboundMessage, MessageId, Network};
use crate::channels::transport::{RoomTransport, TransportError};
use async_trait::async_trait;
use discord_channel::{DiscordClient, DiscordEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const EVENT_QUEUE_DEPTH: usize = 64;

pub struct DiscordTransport {
    client: DiscordClient,
}

fn channel(room_id: &str) -> Result<u64, TransportError> {
    room_id
        .parse()
        .map_err(|_| TransportError::InvalidRoom(room_id.to_string()))
}

impl From<DiscordEvent> for InboundMessage {
    fn from(event: DiscordEvent) -> Self {
        let mut message = InboundMessage::discord(
            event.channel_id.to_string(),
            event.channel_name,
            event.author_id.to_string(),
            event.author_name,
            event.content,
            event.message_id,
        );
        message.author_is_bot = event.author_is_bot;
        message
    }
}

#[async_trait]
impl RoomTransport for DiscordTransport {
    fn network(&self) -> Network {
        Network::Discord
    }

    async fn send_message(&self, room_id: &str, text: &str) -> Result<MessageId, TransportError> {
        self.client
            .send(channel(room_id)?, text)
            .await
            .map_err(|e| TransportError::Send {
                room: room_id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn send_reply(
        &self,
        room_id: &str,
        text: &str,
        in_reply_to: MessageId,
    ) -> Result<MessageId, TransportError> {
        self.client
            .reply(channel(room_id)?, text, in_reply_to)
            .await
            .map_err(|e| TransportError::Send {
                room: room_id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn edit_message(
        &self,
        room_id: &str,
        message_id: MessageId,
        text: &str,
    ) -> Result<bool, TransportError> {
        self.client
            .edit(channel(room_id)?, message_id, text)
            .await
            .map_err(|e| TransportError::Edit {
                room: room_id.to_string(),
                message_id,
                reason: e.to_string(),
            })?;
        Ok(true)
    }
}

/// Connect to Discord and forward every gateway message to `inbound`. Returns the transport and
/// the forwarding task; the task ends when the gateway connection does.
pub async fn start_discord(
    token: &str,
    inbound: mpsc::Sender<InboundMessage>,
) -> anyhow::Result<(Arc<DiscordTransport>, JoinHandle<()>)> {
    let (tx, mut rx) = mpsc::channel::<DiscordEvent>(EVENT_QUEUE_DEPTH);
    let (client, gateway) = discord_channel::connect(token, tx).await?;
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if inbound.send(event.into()).await.is_err() {
                break;
            }
        }
        gateway.abort();
        log::info!("discord inbound loop stopped");
    });
    Ok((Arc::new(DiscordTransport { client }), handle))
}
