//! Per-room priority processor: lets a room mute the bot's fallback chatter.
//!
//! `<trigger> quiet` mutes the room, `<trigger> resume` unmutes it. While muted every other
//! message is claimed with no action, so neither the chain nor the default action runs.

use super::Processor;
use crate::actions::ResolvedAction;
use crate::channels::InboundMessage;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct PriorityProcessor {
    room_id: String,
    trigger: String,
    muted: AtomicBool,
}

impl PriorityProcessor {
    pub fn new(room_id: impl Into<String>, trigger: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            trigger: trigger.into(),
            muted: AtomicBool::new(false),
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// The control word when the message is exactly `<trigger> <word>`.
    fn control_word<'a>(&self, text: &'a str) -> Option<&'a str> {
        let mut tokens = text.split_whitespace();
        let first = tokens.next()?;
        let word = tokens.next()?;
        if tokens.next().is_some() || !first.eq_ignore_ascii_case(&self.trigger) {
            return None;
        }
        Some(word)
    }
}

#[async_trait]
impl Processor for PriorityProcessor {
    fn name(&self) -> &str {
        "priority"
    }

    async fn try_process(&self, message: &InboundMessage) -> anyhow::Result<Option<ResolvedAction>> {
        let word = self.control_word(&message.text).map(str::to_lowercase);
        match word.as_deref() {
            Some("quiet") => {
                if !self.muted.swap(true, Ordering::SeqCst) {
                    log::info!("[{}] muted by {}", self.room_id, message.author_name);
                }
                let hint = format!("Going quiet. `{} resume` wakes me up.", self.trigger);
                Ok(Some(ResolvedAction::reply_to(message, hint)))
            }
            Some("resume") if self.is_muted() => {
                self.muted.store(false, Ordering::SeqCst);
                log::info!("[{}] unmuted by {}", self.room_id, message.author_name);
                Ok(Some(ResolvedAction::reply_to(message, "Back.")))
            }
            _ if self.is_muted() => Ok(Some(ResolvedAction::None)),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str) -> InboundMessage {
        InboundMessage::stack("7", "u", "alice", text, 1)
    }

    #[tokio::test]
    async fn passes_through_when_not_muted() {
        let p = PriorityProcessor::new("7", "!bot");
        assert!(p.try_process(&msg("hello")).await.unwrap().is_none());
        assert!(p.try_process(&msg("!bot resume")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn quiet_then_resume() {
        let p = PriorityProcessor::new("7", "!bot");
        let ack = p.try_process(&msg("!BOT Quiet")).await.unwrap().unwrap();
        assert!(matches!(ack, ResolvedAction::Reply { .. }));
        assert!(p.is_muted());

        let swallowed = p.try_process(&msg("anyone here?")).await.unwrap();
        assert_eq!(swallowed, Some(ResolvedAction::None));

        let back = p.try_process(&msg("!bot resume")).await.unwrap().unwrap();
        assert_eq!(back, ResolvedAction::reply_to(&msg("!bot resume"), "Back."));
        assert!(!p.is_muted());
        assert!(p.try_process(&msg("anyone here?")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn control_word_requires_exact_form() {
        let p = PriorityProcessor::new("7", "!bot");
        assert!(p.try_process(&msg("!bot quiet please")).await.unwrap().is_none());
        assert!(p.try_process(&msg("quiet")).await.unwrap().is_none());
    }
}
