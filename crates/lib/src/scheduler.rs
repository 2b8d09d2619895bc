//! Action scheduler: the single outbound path for one room.
//!
//! Calls are serialized (one in flight per room) and paced so consecutive sends are at least
//! `min_interval` apart. Reply framing is backend-specific: Stack chat replies are plain
//! messages prefixed with `:<id>`, Discord replies carry a native message reference.

use crate::channels::{MessageId, Network, RoomTransport, TransportError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// How a reply references the message it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFraming {
    /// `:<message id> <text>` (Stack chat).
    ColonPrefix,
    /// The transport attaches a message reference; text is left alone (Discord).
    Native,
}

impl ReplyFraming {
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::StackExchange => ReplyFraming::ColonPrefix,
            Network::Discord => ReplyFraming::Native,
        }
    }

    pub fn render(&self, text: &str, in_reply_to: MessageId) -> String {
        match self {
            ReplyFraming::ColonPrefix => format!(":{} {}", in_reply_to, text),
            ReplyFraming::Native => text.to_string(),
        }
    }
}

pub struct ActionScheduler {
    room_id: String,
    network: Network,
    framing: ReplyFraming,
    transport: Arc<dyn RoomTransport>,
    min_interval: Duration,
    /// Held for the whole outbound call; stores when the previous call finished.
    last_send: Mutex<Option<Instant>>,
}

impl ActionScheduler {
    pub fn new(room_id: impl Into<String>, transport: Arc<dyn RoomTransport>) -> Self {
        let network = transport.network();
        Self {
            room_id: room_id.into(),
            network,
            framing: ReplyFraming::for_network(network),
            transport,
            min_interval: Duration::ZERO,
            last_send: Mutex::new(None),
        }
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Reply to `in_reply_to` in this room.
    pub async fn execute_reply(
        &self,
        text: &str,
        in_reply_to: MessageId,
    ) -> Result<MessageId, TransportError> {
        let rendered = self.framing.render(text, in_reply_to);
        self.paced(
            self.transport
                .send_reply(&self.room_id, &rendered, in_reply_to),
        )
        .await
    }

    /// Post a new message in this room.
    pub async fn execute_message(&self, text: &str) -> Result<MessageId, TransportError> {
        self.paced(self.transport.send_message(&self.room_id, text))
            .await
    }

    /// Edit an earlier message in this room.
    pub async fn execute_edit(
        &self,
        message_id: MessageId,
        text: &str,
    ) -> Result<bool, TransportError> {
        self.paced(self.transport.edit_message(&self.room_id, message_id, text))
            .await
    }

    async fn paced<T, F>(&self, call: F) -> Result<T, TransportError>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        let mut last = self.last_send.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        let result = call.await;
        *last = Some(Instant::now());
        if let Err(ref e) = result {
            log::warn!("[{} {}] outbound call failed: {}", self.network, self.room_id, e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::testing::{RecordingTransport, Sent};

    #[tokio::test]
    async fn stack_reply_uses_colon_prefix() {
        let transport = Arc::new(RecordingTransport::new(Network::StackExchange));
        let scheduler = ActionScheduler::new("17", transport.clone());
        scheduler.execute_reply("hi there", 99).await.unwrap();
        assert_eq!(
            transport.sent(),
            vec![Sent::Reply {
                room: "17".into(),
                text: ":99 hi there".into(),
                in_reply_to: 99
            }]
        );
    }

    #[tokio::test]
    async fn discord_reply_keeps_text() {
        let transport = Arc::new(RecordingTransport::new(Network::Discord));
        let scheduler = ActionScheduler::new("555", transport.clone());
        scheduler.execute_reply("hi there", 7).await.unwrap();
        assert_eq!(
            transport.sent(),
            vec![Sent::Reply {
                room: "555".into(),
                text: "hi there".into(),
                in_reply_to: 7
            }]
        );
    }

    #[tokio::test]
    async fn transport_errors_are_surfaced() {
        let transport = Arc::new(RecordingTransport::new(Network::StackExchange));
        transport.fail_sends(true);
        let scheduler = ActionScheduler::new("17", transport.clone());
        assert!(scheduler.execute_message("lost").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn sends_are_paced() {
        let transport = Arc::new(RecordingTransport::new(Network::StackExchange));
        let scheduler = ActionScheduler::new("17", transport.clone())
            .with_min_interval(Duration::from_secs(2));
        let start = Instant::now();
        scheduler.execute_message("one").await.unwrap();
        scheduler.execute_message("two").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(transport.sent().len(), 2);
    }
}
