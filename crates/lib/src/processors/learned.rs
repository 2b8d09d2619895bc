//! Serves replies taught with the `learn` command: `<trigger> <name>` answers with the stored text.

use super::Processor;
use crate::actions::ResolvedAction;
use crate::channels::InboundMessage;
use crate::commands::{LearnedCommand, LEARNED_COMMANDS_COLLECTION};
use crate::repository::Repository;
use async_trait::async_trait;
use std::sync::Arc;

pub struct LearnedCommandProcessor {
    trigger: String,
    repository: Arc<dyn Repository>,
}

impl LearnedCommandProcessor {
    pub fn new(trigger: impl Into<String>, repository: Arc<dyn Repository>) -> Self {
        Self {
            trigger: trigger.into(),
            repository,
        }
    }
}

#[async_trait]
impl Processor for LearnedCommandProcessor {
    fn name(&self) -> &str {
        "learned"
    }

    async fn try_process(&self, message: &InboundMessage) -> anyhow::Result<Option<ResolvedAction>> {
        let mut tokens = message.text.split_whitespace();
        let (Some(first), Some(name)) = (tokens.next(), tokens.next()) else {
            return Ok(None);
        };
        if !first.eq_ignore_ascii_case(&self.trigger) {
            return Ok(None);
        }
        let learned: Vec<LearnedCommand> = self.repository.list(LEARNED_COMMANDS_COLLECTION).await?;
        // Most recent definition wins.
        let hit = learned
            .into_iter()
            .rev()
            .find(|c| c.name.eq_ignore_ascii_case(name));
        Ok(hit.map(|c| ResolvedAction::reply_to(message, c.parameter)))
    }
}
