//! Outbound surface of a chat network client, and a registry of transports by network.

use super::inbound::{MessageId, Network};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Network-level failure of an outbound call. Surfaced to the caller, never swallowed.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no {0} transport registered")]
    NotRegistered(Network),

    #[error("sending to room {room} failed: {reason}")]
    Send { room: String, reason: String },

    #[error("editing message {message_id} in room {room} failed: {reason}")]
    Edit {
        room: String,
        message_id: MessageId,
        reason: String,
    },

    #[error("invalid room id `{0}`")]
    InvalidRoom(String),
}

/// Send/reply/edit against rooms of one network.
#[async_trait]
pub trait RoomTransport: Send + Sync {
    /// Network this transport talks to.
    fn network(&self) -> Network;

    /// Post a new message; returns the id the network assigned.
    async fn send_message(&self, room_id: &str, text: &str) -> Result<MessageId, TransportError>;

    /// Post a message that references `in_reply_to`. Default posts a plain message; the text is
    /// expected to carry any reply framing already.
    async fn send_reply(
        &self,
        room_id: &str,
        text: &str,
        _in_reply_to: MessageId,
    ) -> Result<MessageId, TransportError> {
        self.send_message(room_id, text).await
    }

    /// Replace the text of an earlier message. Returns whether the network accepted the edit.
    async fn edit_message(
        &self,
        room_id: &str,
        message_id: MessageId,
        text: &str,
    ) -> Result<bool, TransportError>;
}

/// Registry of transports keyed by network. Shared across the bridge.
pub struct TransportRegistry {
    inner: Arc<RwLock<HashMap<Network, Arc<dyn RoomTransport>>>>,
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a transport under its own network, replacing any previous one.
    pub async fn register(&self, transport: Arc<dyn RoomTransport>) {
        let network = transport.network();
        if self.inner.write().await.insert(network, transport).is_some() {
            log::debug!("replaced {} transport", network);
        }
    }

    pub async fn get(&self, network: Network) -> Result<Arc<dyn RoomTransport>, TransportError> {
        self.inner
            .read()
            .await
            .get(&network)
            .cloned()
            .ok_or(TransportError::NotRegistered(network))
    }

    pub async fn networks(&self) -> Vec<Network> {
        self.inner.read().await.keys().copied().collect()
    }
}
