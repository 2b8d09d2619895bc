//! Inbound message from either network: delivered to the bridge for routing or relay.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Network-specific message id (Stack chat and Discord both use 64-bit ids).
pub type MessageId = u64;

/// The chat network a message came from or a room lives on.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Network {
    /// Stack Exchange chat (the primary network; commands run here).
    StackExchange,
    /// Discord (the secondary network; mapped channels are relayed).
    Discord,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::StackExchange => "stack",
            Network::Discord => "discord",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message received from a network. Immutable once built; consumed once by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub network: Network,
    /// Room id (Stack) or channel id (Discord).
    pub room_id: String,
    /// Human name of the room. Discord channel names are the relay mapping key; equals `room_id` on Stack.
    pub room_name: String,
    pub author_id: String,
    pub author_name: String,
    /// Set for messages written by a bot (including ourselves); these are never routed or relayed.
    pub author_is_bot: bool,
    pub text: String,
    pub message_id: MessageId,
}

impl InboundMessage {
    /// Message in a Stack chat room (room name defaults to the id).
    pub fn stack(
        room_id: impl Into<String>,
        author_id: impl Into<String>,
        author_name: impl Into<String>,
        text: impl Into<String>,
        message_id: MessageId,
    ) -> Self {
        let room_id = room_id.into();
        Self {
            network: Network::StackExchange,
            room_name: room_id.clone(),
            room_id,
            author_id: author_id.into(),
            author_name: author_name.into(),
            author_is_bot: false,
            text: text.into(),
            message_id,
        }
    }

    /// Message in a Discord channel.
    pub fn discord(
        channel_id: impl Into<String>,
        channel_name: impl Into<String>,
        author_id: impl Into<String>,
        author_name: impl Into<String>,
        text: impl Into<String>,
        message_id: MessageId,
    ) -> Self {
        Self {
            network: Network::Discord,
            room_id: channel_id.into(),
            room_name: channel_name.into(),
            author_id: author_id.into(),
            author_name: author_name.into(),
            author_is_bot: false,
            text: text.into(),
            message_id,
        }
    }
}
