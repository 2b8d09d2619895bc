//! Resolved actions produced by commands and processors, and the router's default fallback.

use crate::channels::{InboundMessage, MessageId, TransportError};
use crate::scheduler::ActionScheduler;

/// What to do in the room in response to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedAction {
    Reply {
        text: String,
        in_reply_to: MessageId,
    },
    NewMessage(String),
    Edit {
        message_id: MessageId,
        text: String,
    },
    /// Nothing to send. Never reaches the scheduler.
    None,
}

impl ResolvedAction {
    pub fn reply_to(message: &InboundMessage, text: impl Into<String>) -> Self {
        ResolvedAction::Reply {
            text: text.into(),
            in_reply_to: message.message_id,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ResolvedAction::None)
    }

    /// Run the action against the room's scheduler.
    pub async fn execute(self, scheduler: &ActionScheduler) -> Result<(), TransportError> {
        match self {
            ResolvedAction::Reply { text, in_reply_to } => {
                scheduler.execute_reply(&text, in_reply_to).await?;
            }
            ResolvedAction::NewMessage(text) => {
                scheduler.execute_message(&text).await?;
            }
            ResolvedAction::Edit { message_id, text } => {
                if !scheduler.execute_edit(message_id, &text).await? {
                    log::debug!(
                        "[{}] edit of message {} was not accepted",
                        scheduler.room_id(),
                        message_id
                    );
                }
            }
            ResolvedAction::None => {}
        }
        Ok(())
    }
}

/// Fallback when neither a command nor any processor claimed a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultAction {
    /// Do nothing.
    Ignore,
    /// Reply with a hint when the message was addressed to the bot with an unknown command name.
    UnknownCommandHint { trigger: String },
}

impl DefaultAction {
    pub fn resolve(&self, message: &InboundMessage) -> ResolvedAction {
        let DefaultAction::UnknownCommandHint { trigger } = self else {
            return ResolvedAction::None;
        };
        let mut tokens = message.text.split_whitespace();
        match (tokens.next(), tokens.next()) {
            (Some(first), Some(name)) if first.eq_ignore_ascii_case(trigger) => {
                ResolvedAction::reply_to(message, format!("I don't know the command `{}`.", name))
            }
            _ => ResolvedAction::None,
        }
    }
}
