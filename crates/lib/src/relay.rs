//! Relay mediator: forwards messages from mapped Discord channels into Stack chat rooms.
//!
//! The target room's session is reused when it exists, opened on demand when the bot watches
//! the room, and otherwise the source channel is told the room is not being watched.

use crate::channels::{InboundMessage, Network, RoomTransport, TransportError};
use crate::session::{RoomKey, RoomSession, SchedulerFactory, SessionRegistry, WatcherRegistry};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Discord channel name → Stack room id. Read-only after startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelRoomMap {
    map: HashMap<String, String>,
}

impl ChannelRoomMap {
    pub fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn room_for(&self, channel_name: &str) -> Option<&str> {
        self.map.get(channel_name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl From<&BTreeMap<String, String>> for ChannelRoomMap {
    fn from(map: &BTreeMap<String, String>) -> Self {
        Self::new(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

/// What happened to one Discord message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Bot-authored or empty message.
    Ignored,
    /// The channel has no mapping.
    Unmapped,
    /// No session and no watcher for the target room; the source channel was notified.
    NotWatching { room_id: String },
    Forwarded {
        room_id: String,
        count: usize,
        /// A new session was opened for this message.
        opened: bool,
    },
}

fn not_watching_notice(room_id: &str) -> String {
    format!(
        "Unable to relay to Stack room {}: I am not watching it. Invite me to the room and try again.",
        room_id
    )
}

fn opened_notice(room_id: &str) -> String {
    format!("Opened a new session for relaying to Stack room {}.", room_id)
}

/// Split a Discord message into Stack chat messages, in order: each fenced code block becomes a
/// fixed-font message (every line indented four spaces), other text is prefixed with the author.
pub fn build_forward_messages(author: &str, text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut push_text = |segment: &str, out: &mut Vec<String>| {
        let segment = segment.trim();
        if !segment.is_empty() {
            out.push(format!("**{}**: {}", author, segment));
        }
    };

    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after_open = &rest[open + 3..];
        let Some(close) = after_open.find("```") else {
            break;
        };
        push_text(&rest[..open], &mut out);
        let block = &after_open[..close];
        // Drop the language tag on the opening fence line.
        let code = match block.find('\n') {
            Some(nl) if !block[..nl].trim().contains(' ') => &block[nl + 1..],
            _ => block,
        };
        let code = code.trim_matches('\n');
        if !code.trim().is_empty() {
            out.push(
                code.lines()
                    .map(|l| format!("    {}", l))
                    .collect::<Vec<_>>()
                    .join("\n"),
            );
        }
        rest = &after_open[close + 3..];
    }
    push_text(rest, &mut out);
    out
}

pub struct RelayMediator {
    map: ChannelRoomMap,
    sessions: Arc<SessionRegistry>,
    watchers: Arc<WatcherRegistry>,
    factory: Arc<dyn SchedulerFactory>,
}

impl RelayMediator {
    pub fn new(
        map: ChannelRoomMap,
        sessions: Arc<SessionRegistry>,
        watchers: Arc<WatcherRegistry>,
        factory: Arc<dyn SchedulerFactory>,
    ) -> Self {
        Self {
            map,
            sessions,
            watchers,
            factory,
        }
    }

    pub fn map(&self) -> &ChannelRoomMap {
        &self.map
    }

    /// Forward one Discord message. `source` is the Discord transport used for notices back to
    /// the originating channel. Transport errors while forwarding are returned after the source
    /// channel has been told.
    pub async fn relay(
        &self,
        message: &InboundMessage,
        source: &dyn RoomTransport,
    ) -> Result<RelayOutcome, TransportError> {
        if message.author_is_bot {
            return Ok(RelayOutcome::Ignored);
        }
        log::debug!("[DIS {}] {}", message.room_name, message.text);
        let Some(room_id) = self.map.room_for(&message.room_name) else {
            return Ok(RelayOutcome::Unmapped);
        };
        let forwards = build_forward_messages(&message.author_name, &message.text);
        if forwards.is_empty() {
            return Ok(RelayOutcome::Ignored);
        }

        let Some((session, opened)) = self.resolve_session(room_id).await else {
            log::info!(
                "relay from #{} dropped: room {} is not watched",
                message.room_name,
                room_id
            );
            source
                .send_message(&message.room_id, &not_watching_notice(room_id))
                .await?;
            return Ok(RelayOutcome::NotWatching {
                room_id: room_id.to_string(),
            });
        };
        if opened {
            source
                .send_message(&message.room_id, &opened_notice(room_id))
                .await?;
        }

        for (i, text) in forwards.iter().enumerate() {
            if let Err(e) = session.scheduler.execute_message(text).await {
                let notice = format!(
                    "Relayed {} of {} parts to Stack room {}, then failed: {}",
                    i,
                    forwards.len(),
                    room_id,
                    e
                );
                if let Err(notify_err) = source.send_message(&message.room_id, &notice).await {
                    log::warn!("could not notify #{}: {}", message.room_name, notify_err);
                }
                return Err(e);
            }
        }
        Ok(RelayOutcome::Forwarded {
            room_id: room_id.to_string(),
            count: forwards.len(),
            opened,
        })
    }

    /// Existing session, or one opened from the room's watcher. None when neither exists.
    async fn resolve_session(&self, room_id: &str) -> Option<(Arc<RoomSession>, bool)> {
        let key = RoomKey::new(Network::StackExchange, room_id);
        if let Some(session) = self.sessions.get(&key).await {
            return Some((session, false));
        }
        let watcher = self.watchers.get(room_id).await?;
        let factory = self.factory.clone();
        Some(
            self.sessions
                .get_or_create_with(key, move |k| {
                    RoomSession::new(k.clone(), watcher.auth.clone(), factory.open(&watcher))
                })
                .await,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::testing::{RecordingTransport, Sent};
    use crate::session::{AuthHandle, TransportSchedulerFactory, Watcher};
    use std::time::Duration;

    struct Fixture {
        stack: Arc<RecordingTransport>,
        discord: RecordingTransport,
        sessions: Arc<SessionRegistry>,
        watchers: Arc<WatcherRegistry>,
        mediator: RelayMediator,
    }

    fn fixture() -> Fixture {
        let stack = Arc::new(RecordingTransport::new(Network::StackExchange));
        let sessions = Arc::new(SessionRegistry::new());
        let watchers = Arc::new(WatcherRegistry::new());
        let map = ChannelRoomMap::new(HashMap::from([("general".to_string(), "17".to_string())]));
        let factory = Arc::new(TransportSchedulerFactory::new(stack.clone(), Duration::ZERO));
        Fixture {
            stack,
            discord: RecordingTransport::new(Network::Discord),
            mediator: RelayMediator::new(map, sessions.clone(), watchers.clone(), factory),
            sessions,
            watchers,
        }
    }

    fn from_general(text: &str) -> InboundMessage {
        InboundMessage::discord("555", "general", "u1", "alice", text, 9)
    }

    #[tokio::test]
    async fn unwatched_room_gets_one_notice_and_no_forwards() {
        let f = fixture();
        let outcome = f
            .mediator
            .relay(&from_general("hi\n```\ncode\n```"), &f.discord)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RelayOutcome::NotWatching {
                room_id: "17".into()
            }
        );
        assert!(f.stack.sent().is_empty());
        let notices = f.discord.sent();
        assert_eq!(notices.len(), 1);
        assert!(matches!(&notices[0], Sent::Message { room, text } if room == "555" && text.contains("not watching")));
        assert!(f.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn watched_room_opens_session_once() {
        let f = fixture();
        f.watchers
            .watch(Watcher {
                room_id: "17".into(),
                auth: AuthHandle::new("chat.stackoverflow.com", None),
            })
            .await;

        let first = f.mediator.relay(&from_general("one"), &f.discord).await.unwrap();
        let second = f.mediator.relay(&from_general("two"), &f.discord).await.unwrap();
        assert_eq!(
            first,
            RelayOutcome::Forwarded {
                room_id: "17".into(),
                count: 1,
                opened: true
            }
        );
        assert_eq!(
            second,
            RelayOutcome::Forwarded {
                room_id: "17".into(),
                count: 1,
                opened: false
            }
        );
        assert_eq!(f.discord.sent().len(), 1);
        assert_eq!(f.sessions.len().await, 1);
        assert_eq!(
            f.stack.sent(),
            vec![
                Sent::Message {
                    room: "17".into(),
                    text: "**alice**: one".into()
                },
                Sent::Message {
                    room: "17".into(),
                    text: "**alice**: two".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn unmapped_and_bot_messages_are_ignored() {
        let f = fixture();
        let other = InboundMessage::discord("556", "random", "u1", "alice", "hi", 1);
        assert_eq!(
            f.mediator.relay(&other, &f.discord).await.unwrap(),
            RelayOutcome::Unmapped
        );
        let mut bot = from_general("hi");
        bot.author_is_bot = true;
        assert_eq!(
            f.mediator.relay(&bot, &f.discord).await.unwrap(),
            RelayOutcome::Ignored
        );
        assert!(f.discord.sent().is_empty());
    }

    #[tokio::test]
    async fn transport_fault_stops_forwarding_and_tells_source() {
        let f = fixture();
        f.watchers
            .watch(Watcher {
                room_id: "17".into(),
                auth: AuthHandle::default(),
            })
            .await;
        f.stack.fail_sends(true);
        let err = f
            .mediator
            .relay(&from_general("a\n```\nb\n```\nc"), &f.discord)
            .await;
        assert!(err.is_err());
        let notices = f.discord.sent();
        assert_eq!(notices.len(), 2);
        assert!(matches!(&notices[1], Sent::Message { text, .. } if text.contains("0 of 3")));
    }

    #[test]
    fn plain_text_is_one_attributed_message() {
        assert_eq!(
            build_forward_messages("alice", "  hello there "),
            vec!["**alice**: hello there".to_string()]
        );
        assert!(build_forward_messages("alice", "   ").is_empty());
    }

    #[test]
    fn code_blocks_are_split_out_in_order() {
        let text = "look at this\n```rust\nfn main() {}\nlet x = 1;\n```\nthoughts?";
        assert_eq!(
            build_forward_messages("bob", text),
            vec![
                "**bob**: look at this".to_string(),
                "    fn main() {}\n    let x = 1;".to_string(),
                "**bob**: thoughts?".to_string(),
            ]
        );
    }

    #[test]
    fn inline_fence_without_language_keeps_content() {
        assert_eq!(
            build_forward_messages("bob", "```a b c```"),
            vec!["    a b c".to_string()]
        );
    }

    #[test]
    fn unclosed_fence_stays_text() {
        assert_eq!(
            build_forward_messages("bob", "oops ``` never closed"),
            vec!["**bob**: oops ``` never closed".to_string()]
        );
    }
}
