//! Built-in commands shipped with the bot.

use super::{Command, CommandRegistry};
use crate::channels::InboundMessage;
use crate::filehost::FileHost;
use crate::repository::Repository;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};

/// Repository collection holding learned commands.
pub const LEARNED_COMMANDS_COLLECTION: &str = "Commands";

/// A learned command as stored in the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedCommand {
    pub name: String,
    pub parameter: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub learned_at: String,
}

/// `echo <words…>`: repeats its parameters.
#[derive(Debug, Default)]
pub struct EchoCommand;

#[async_trait]
impl Command for EchoCommand {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "repeat the given words"
    }

    async fn process(
        &self,
        _message: &InboundMessage,
        parameters: &[String],
    ) -> anyhow::Result<Option<String>> {
        let text = parameters.join(" ");
        Ok((!text.is_empty()).then_some(text))
    }
}

/// `commands`: lists the loaded native commands.
pub struct CommandsCommand {
    registry: Weak<CommandRegistry>,
}

impl CommandsCommand {
    pub fn new(registry: Weak<CommandRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Command for CommandsCommand {
    fn name(&self) -> &str {
        "commands"
    }

    fn description(&self) -> &str {
        "list available commands"
    }

    async fn process(
        &self,
        _message: &InboundMessage,
        _parameters: &[String],
    ) -> anyhow::Result<Option<String>> {
        let registry = self
            .registry
            .upgrade()
            .context("command registry is gone")?;
        let list = registry
            .descriptors()
            .await
            .into_iter()
            .map(|d| {
                if d.description.is_empty() {
                    d.name
                } else {
                    format!("{} ({})", d.name, d.description)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        Ok(Some(format!("Commands: {}", list)))
    }
}

/// `learn <name> <text…>`: teaches the bot a canned reply, served by the learned-command processor.
pub struct LearnCommand {
    repository: Arc<dyn Repository>,
}

impl LearnCommand {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Command for LearnCommand {
    fn name(&self) -> &str {
        "learn"
    }

    fn description(&self) -> &str {
        "learn <name> <reply>: teach a canned reply"
    }

    async fn process(
        &self,
        message: &InboundMessage,
        parameters: &[String],
    ) -> anyhow::Result<Option<String>> {
        let Some((name, rest)) = parameters.split_first() else {
            return Ok(Some("Usage: learn <name> <reply>".to_string()));
        };
        let parameter = rest.join(" ");
        if parameter.trim().is_empty() {
            return Ok(Some(format!("Nothing to learn for `{}`.", name)));
        }
        let learned = LearnedCommand {
            name: name.to_lowercase(),
            parameter,
            author: message.author_name.clone(),
            learned_at: chrono::Utc::now().to_rfc3339(),
        };
        let id = self
            .repository
            .add(LEARNED_COMMANDS_COLLECTION, &learned)
            .await
            .with_context(|| format!("storing learned command `{}`", learned.name))?;
        log::debug!("learned command {} stored as {}", learned.name, id);
        Ok(Some(format!("Learned `{}`.", learned.name)))
    }
}

/// `paste <text…>`: uploads the text to the file host and replies with the link.
pub struct PasteCommand {
    host: Arc<dyn FileHost>,
}

impl PasteCommand {
    pub fn new(host: Arc<dyn FileHost>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Command for PasteCommand {
    fn name(&self) -> &str {
        "paste"
    }

    fn description(&self) -> &str {
        "upload text and link it"
    }

    async fn process(
        &self,
        _message: &InboundMessage,
        parameters: &[String],
    ) -> anyhow::Result<Option<String>> {
        let text = parameters.join(" ");
        if text.is_empty() {
            return Ok(None);
        }
        let url = self.host.upload(text.into_bytes()).await?;
        Ok(Some(url))
    }
}

/// Register the built-in commands. `paste` is only registered when a file host is available.
pub async fn register_builtin_commands(
    registry: &Arc<CommandRegistry>,
    repository: Arc<dyn Repository>,
    file_host: Option<Arc<dyn FileHost>>,
) {
    registry.register::<EchoCommand>().await;

    let weak = Arc::downgrade(registry);
    registry
        .register_with(
            std::any::type_name::<CommandsCommand>(),
            Arc::new(move || Box::new(CommandsCommand::new(weak.clone())) as Box<dyn Command>),
        )
        .await;

    registry
        .register_with(
            std::any::type_name::<LearnCommand>(),
            Arc::new(move || Box::new(LearnCommand::new(repository.clone())) as Box<dyn Command>),
        )
        .await;

    if let Some(host) = file_host {
        registry
            .register_with(
                std::any::type_name::<PasteCommand>(),
                Arc::new(move || Box::new(PasteCommand::new(host.clone())) as Box<dyn Command>),
            )
            .await;
    }
}
