//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use stackcord::channels::{MessageId, Network, RoomTransport, TransportError};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Send { room: String, text: String },
    Reply { room: String, text: String, in_reply_to: MessageId },
    Edit { room: String, message_id: MessageId, text: String },
}

/// Records every outbound call; ids count up from 500. With `fail_all` set, every call
/// fails and is only counted in `attempts`.
pub struct Recorder {
    network: Network,
    next_id: AtomicU64,
    fail: AtomicBool,
    attempts: AtomicUsize,
    calls: Mutex<Vec<Call>>,
}

impl Recorder {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            next_id: AtomicU64::new(500),
            fail: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Outbound calls tried, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn push(&self, call: Call) -> Result<MessageId, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            let room = match &call {
                Call::Send { room, .. } | Call::Reply { room, .. } | Call::Edit { room, .. } => {
                    room.clone()
                }
            };
            return Err(TransportError::Send {
                room,
                reason: "socket closed".into(),
            });
        }
        self.calls.lock().unwrap().push(call);
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl RoomTransport for Recorder {
    fn network(&self) -> Network {
        self.network
    }

    async fn send_message(&self, room_id: &str, text: &str) -> Result<MessageId, TransportError> {
        self.push(Call::Send {
            room: room_id.into(),
            text: text.into(),
        })
    }

    async fn send_reply(
        &self,
        room_id: &str,
        text: &str,
        in_reply_to: MessageId,
    ) -> Result<MessageId, TransportError> {
        self.push(Call::Reply {
            room: room_id.into(),
            text: text.into(),
            in_reply_to,
        })
    }

    async fn edit_message(
        &self,
        room_id: &str,
        message_id: MessageId,
        text: &str,
    ) -> Result<bool, TransportError> {
        self.push(Call::Edit {
            room: room_id.into(),
            message_id,
            text: text.into(),
        })
        .map(|_| true)
    }
}
