//! Recording transport for unit tests.

use crate::channels::inbound::{MessageId, Network};
use crate::channels::transport::{RoomTransport, TransportError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Message { room: String, text: String },
    Reply { room: String, text: String, in_reply_to: MessageId },
    Edit { room: String, message_id: MessageId, text: String },
}

pub struct RecordingTransport {
    network: Network,
    next_id: AtomicU64,
    fail: AtomicBool,
    held: Mutex<Option<(String, Arc<Semaphore>)>>,
    sent: Mutex<Vec<Sent>>,
}

impl RecordingTransport {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            next_id: AtomicU64::new(1000),
            fail: AtomicBool::new(false),
            held: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Hold every send to `room` until the returned semaphore gets a permit.
    pub fn hold(&self, room: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.held.lock().unwrap() = Some((room.to_string(), gate.clone()));
        gate
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    async fn record(&self, room: &str, entry: Sent) -> Result<MessageId, TransportError> {
        let gate = self
            .held
            .lock()
            .unwrap()
            .as_ref()
            .filter(|(held, _)| held == room)
            .map(|(_, gate)| gate.clone());
        if let Some(gate) = gate {
            let _ = gate.acquire().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Send {
                room: room.to_string(),
                reason: "connection reset".to_string(),
            });
        }
        self.sent.lock().unwrap().push(entry);
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl RoomTransport for RecordingTransport {
    fn network(&self) -> Network {
        self.network
    }

    async fn send_message(&self, room_id: &str, text: &str) -> Result<MessageId, TransportError> {
        self.record(
            room_id,
            Sent::Message {
                room: room_id.to_string(),
                text: text.to_string(),
            },
        )
        .await
    }

    async fn send_reply(
        &self,
        room_id: &str,
        text: &str,
        in_reply_to: MessageId,
    ) -> Result<MessageId, TransportError> {
        self.record(
            room_id,
            Sent::Reply {
                room: room_id.to_string(),
                text: text.to_string(),
                in_reply_to,
            },
        )
        .await
    }

    async fn edit_message(
        &self,
        room_id: &str,
        message_id: MessageId,
        text: &str,
    ) -> Result<bool, TransportError> {
        self.record(
            room_id,
            Sent::Edit {
                room: room_id.to_string(),
                message_id,
                text: text.to_string(),
            },
        )
        .await
        .map(|_| true)
    }
}
