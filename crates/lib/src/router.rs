//! Command router: decides what, if anything, a room message triggers.
//!
//! Order per message, first match wins: native command, the room's priority processor, the
//! processor chain, the default action. Any fault on the way (error or panic from a plugin,
//! failed send) is reported into the room as a code-formatted diagnostic; it never escapes.

use crate::actions::{DefaultAction, ResolvedAction};
use crate::channels::{InboundMessage, Network};
use crate::commands::CommandRegistry;
use crate::processors::{Processor, ProcessorChain};
use crate::scheduler::ActionScheduler;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// A message split into trigger, command name and decoded parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTokens {
    pub trigger: String,
    pub name: String,
    pub parameters: Vec<String>,
}

/// Split on whitespace. Fewer than two tokens means there is no command name.
pub fn tokenize(text: &str) -> Option<CommandTokens> {
    let mut tokens = text.split_whitespace();
    let trigger = tokens.next()?.to_string();
    let name = tokens.next()?.to_string();
    let parameters = tokens.map(decode_html_entities).collect();
    Some(CommandTokens {
        trigger,
        name,
        parameters,
    })
}

/// Decode HTML character references (`&amp;`, `&#39;`, `&#x27;`, ...). Unknown ones are kept verbatim.
pub fn decode_html_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&semi| semi <= 12)
            .and_then(|semi| decode_entity(&tail[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Render a fault so it shows as a code block on the room's network.
pub fn format_diagnostic(network: Network, author: &str, detail: &str) -> String {
    let body = format!("Sorry {}, that message broke me.\n\n{}", author, detail.trim_end());
    match network {
        Network::StackExchange => body
            .lines()
            .map(|l| format!("    {}", l))
            .collect::<Vec<_>>()
            .join("\n"),
        Network::Discord => format!("```\n{}\n```", body.replace("```", "`\u{200b}``")),
    }
}

fn panic_detail(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic with a non-string payload".to_string()
    }
}

/// How a message was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Command(String),
    Priority,
    Processor(String),
    Default,
    /// A fault was caught and reported to the room.
    Failed,
}

/// Router for one room.
pub struct CommandRouter {
    room_id: String,
    /// When set, native commands only run if the first token is this trigger.
    trigger: Option<String>,
    registry: Arc<CommandRegistry>,
    priority: Arc<dyn Processor>,
    chain: Arc<ProcessorChain>,
    default_action: DefaultAction,
    scheduler: Arc<ActionScheduler>,
}

impl CommandRouter {
    pub fn new(
        registry: Arc<CommandRegistry>,
        priority: Arc<dyn Processor>,
        chain: Arc<ProcessorChain>,
        scheduler: Arc<ActionScheduler>,
    ) -> Self {
        Self {
            room_id: scheduler.room_id().to_string(),
            trigger: None,
            registry,
            priority,
            chain,
            default_action: DefaultAction::Ignore,
            scheduler,
        }
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    pub fn with_default_action(mut self, action: DefaultAction) -> Self {
        self.default_action = action;
        self
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn scheduler(&self) -> &Arc<ActionScheduler> {
        &self.scheduler
    }

    /// Handle one message. Never fails; faults are reported into the room.
    pub async fn route(&self, message: &InboundMessage) -> RouteOutcome {
        let detail = match AssertUnwindSafe(self.try_route(message)).catch_unwind().await {
            Ok(Ok(outcome)) => return outcome,
            Ok(Err(e)) => format!("{:?}", e),
            Err(panic) => panic_detail(panic),
        };
        log::warn!(
            "[{}] routing message {} from {} failed: {}",
            self.room_id,
            message.message_id,
            message.author_name,
            detail
        );
        let diagnostic = format_diagnostic(self.scheduler.network(), &message.author_name, &detail);
        if let Err(e) = self.scheduler.execute_message(&diagnostic).await {
            log::error!("[{}] could not report fault to the room: {}", self.room_id, e);
        }
        RouteOutcome::Failed
    }

    async fn try_route(&self, message: &InboundMessage) -> anyhow::Result<RouteOutcome> {
        if let Some(tokens) = tokenize(&message.text) {
            if let Some(outcome) = self.dispatch_native(message, &tokens).await? {
                return Ok(outcome);
            }
        }

        if let Some(action) = self.priority.try_process(message).await? {
            self.execute(action).await?;
            return Ok(RouteOutcome::Priority);
        }

        if let Some((name, action)) = self.chain.claim(message).await? {
            self.execute(action).await?;
            return Ok(RouteOutcome::Processor(name));
        }

        self.execute(self.default_action.resolve(message)).await?;
        Ok(RouteOutcome::Default)
    }

    async fn dispatch_native(
        &self,
        message: &InboundMessage,
        tokens: &CommandTokens,
    ) -> anyhow::Result<Option<RouteOutcome>> {
        if let Some(ref trigger) = self.trigger {
            if !tokens.trigger.eq_ignore_ascii_case(trigger) {
                return Ok(None);
            }
        }
        let Some(descriptor) = self.registry.resolve(&tokens.name).await else {
            return Ok(None);
        };
        let command = descriptor.instantiate();
        let response = command.process(message, &tokens.parameters).await?;
        if let Some(response) = response.filter(|r| !r.is_empty()) {
            self.scheduler
                .execute_reply(&response, message.message_id)
                .await?;
            log::info!(
                "[{}] {} invoked {} ({}): {}",
                message.room_id,
                message.author_name,
                descriptor.name,
                descriptor.source,
                response
            );
        }
        Ok(Some(RouteOutcome::Command(descriptor.name)))
    }

    async fn execute(&self, action: ResolvedAction) -> anyhow::Result<()> {
        if action.is_none() {
            return Ok(());
        }
        action.execute(&self.scheduler).await?;
        Ok(())
    }
}
