//! Console transport: prints outbound traffic to stdout. Used by `stackcord simulate`.

use crate::channels::inbound::{MessageId, Network};
use crate::channels::transport::{RoomTransport, TransportError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct ConsoleTransport {
    network: Network,
    next_id: AtomicU64,
}

impl ConsoleTransport {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl RoomTransport for ConsoleTransport {
    fn network(&self) -> Network {
        self.network
    }

    async fn send_message(&self, room_id: &str, text: &str) -> Result<MessageId, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        println!("[{} {}] #{} {}", self.network, room_id, id, text);
        Ok(id)
    }

    async fn send_reply(
        &self,
        room_id: &str,
        text: &str,
        in_reply_to: MessageId,
    ) -> Result<MessageId, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        println!("[{} {}] #{} (re #{}) {}", self.network, room_id, id, in_reply_to, text);
        Ok(id)
    }

    async fn edit_message(
        &self,
        room_id: &str,
        message_id: MessageId,
        text: &str,
    ) -> Result<bool, TransportError> {
        println!("[{} {}] #{} edited: {}", self.network, room_id, message_id, text);
        Ok(true)
    }
}
