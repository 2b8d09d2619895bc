//! Native commands: the `Command` plugin trait and the registry that resolves them by name.
//!
//! Commands are registered explicitly (a type or a factory closure). `reload` instantiates each
//! registration once, folds names to lowercase and swaps the whole table in at once; a name
//! claimed by two registrations fails the reload and leaves the previous table in place.

mod builtin;

pub use builtin::{
    register_builtin_commands, CommandsCommand, EchoCommand, LearnCommand, LearnedCommand,
    PasteCommand, LEARNED_COMMANDS_COLLECTION,
};

use crate::channels::InboundMessage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A native command, invoked as `<trigger> <name> <parameters…>`.
#[async_trait]
pub trait Command: Send + Sync {
    /// Name the command is invoked by (matched case-insensitively).
    fn name(&self) -> &str;

    /// One-line description for the `commands` listing.
    fn description(&self) -> &str {
        ""
    }

    /// Run the command. `Ok(None)` or an empty string means no reply is wanted.
    async fn process(
        &self,
        message: &InboundMessage,
        parameters: &[String],
    ) -> anyhow::Result<Option<String>>;
}

/// Builds a fresh command instance; called once per reload and once per dispatch.
pub type CommandFactory = Arc<dyn Fn() -> Box<dyn Command> + Send + Sync>;

/// A loaded command: folded name, where it came from, and how to instantiate it.
#[derive(Clone)]
pub struct CommandDescriptor {
    pub name: String,
    pub source: String,
    pub description: String,
    factory: CommandFactory,
}

impl CommandDescriptor {
    pub fn instantiate(&self) -> Box<dyn Command> {
        (self.factory)()
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("command name `{name}` is claimed by both {first} and {second}")]
    Duplicate {
        name: String,
        first: String,
        second: String,
    },

    #[error("command registered by {0} has an empty name")]
    EmptyName(String),
}

struct Registration {
    source: String,
    factory: CommandFactory,
}

type CommandTable = Arc<HashMap<String, CommandDescriptor>>;

/// Name → command table, swapped atomically on reload.
pub struct CommandRegistry {
    registrations: RwLock<Vec<Registration>>,
    table: RwLock<CommandTable>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            registrations: RwLock::new(Vec::new()),
            table: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Register a command type. Takes effect on the next `reload`.
    pub async fn register<C>(&self)
    where
        C: Command + Default + 'static,
    {
        self.register_with(
            std::any::type_name::<C>(),
            Arc::new(|| Box::new(C::default()) as Box<dyn Command>),
        )
        .await;
    }

    /// Register a factory (for commands that capture collaborators). Takes effect on the next `reload`.
    pub async fn register_with(&self, source: impl Into<String>, factory: CommandFactory) {
        self.registrations.write().await.push(Registration {
            source: source.into(),
            factory,
        });
    }

    /// Rebuild the table from all registrations and swap it in. Returns the number of commands.
    pub async fn reload(&self) -> Result<usize, RegistryError> {
        let registrations = self.registrations.read().await;
        let mut table: HashMap<String, CommandDescriptor> = HashMap::new();
        for reg in registrations.iter() {
            let instance = (reg.factory)();
            let name = instance.name().trim().to_lowercase();
            if name.is_empty() {
                return Err(RegistryError::EmptyName(reg.source.clone()));
            }
            if let Some(existing) = table.get(&name) {
                log::error!(
                    "command `{}` registered twice ({} and {}); keeping the previous command table",
                    name,
                    existing.source,
                    reg.source
                );
                return Err(RegistryError::Duplicate {
                    name,
                    first: existing.source.clone(),
                    second: reg.source.clone(),
                });
            }
            let descriptor = CommandDescriptor {
                name: name.clone(),
                source: reg.source.clone(),
                description: instance.description().to_string(),
                factory: reg.factory.clone(),
            };
            table.insert(name, descriptor);
        }
        drop(registrations);

        for d in table.values() {
            log::info!("loaded command {} from {}", d.name, d.source);
        }
        let count = table.len();
        *self.table.write().await = Arc::new(table);
        Ok(count)
    }

    /// Case-insensitive lookup.
    pub async fn resolve(&self, name: &str) -> Option<CommandDescriptor> {
        let table = self.table.read().await.clone();
        table.get(&name.to_lowercase()).cloned()
    }

    /// Loaded commands sorted by name.
    pub async fn descriptors(&self) -> Vec<CommandDescriptor> {
        let table = self.table.read().await.clone();
        let mut out: Vec<CommandDescriptor> = table.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub {
        name: &'static str,
        reply: &'static str,
    }

    #[async_trait]
    impl Command for Stub {
        fn name(&self) -> &str {
            self.name
        }

        async fn process(
            &self,
            _message: &InboundMessage,
            _parameters: &[String],
        ) -> anyhow::Result<Option<String>> {
            Ok(Some(self.reply.to_string()))
        }
    }

    fn stub(name: &'static str, reply: &'static str) -> CommandFactory {
        Arc::new(move || Box::new(Stub { name, reply }) as Box<dyn Command>)
    }

    #[tokio::test]
    async fn resolve_is_case_insensitive() {
        let registry = CommandRegistry::new();
        registry.register_with("stub::Echo", stub("Echo", "e")).await;
        assert_eq!(registry.reload().await.unwrap(), 1);
        let a = registry.resolve("Echo").await.unwrap();
        let b = registry.resolve("echo").await.unwrap();
        let c = registry.resolve("ECHO").await.unwrap();
        assert_eq!(a.name, "echo");
        assert_eq!(a.source, b.source);
        assert_eq!(b.source, c.source);
    }

    #[tokio::test]
    async fn duplicate_names_fail_and_neither_wins() {
        let registry = CommandRegistry::new();
        registry.register_with("first::Echo", stub("echo", "first")).await;
        registry.register_with("second::Echo", stub("ECHO", "second")).await;
        let err = registry.reload().await.unwrap_err();
        match err {
            RegistryError::Duplicate { name, first, second } => {
                assert_eq!(name, "echo");
                assert_eq!(first, "first::Echo");
                assert_eq!(second, "second::Echo");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(registry.resolve("echo").await.is_none());
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_table() {
        let registry = CommandRegistry::new();
        registry.register_with("a::Ping", stub("ping", "pong")).await;
        registry.reload().await.unwrap();
        registry.register_with("b::Echo", stub("echo", "1")).await;
        registry.register_with("c::Echo", stub("echo", "2")).await;
        assert!(registry.reload().await.is_err());
        assert!(registry.resolve("ping").await.is_some());
        assert!(registry.resolve("echo").await.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let registry = CommandRegistry::new();
        registry.register_with("blank::Cmd", stub("  ", "x")).await;
        assert!(matches!(
            registry.reload().await,
            Err(RegistryError::EmptyName(source)) if source == "blank::Cmd"
        ));
    }

    #[tokio::test]
    async fn instantiate_builds_fresh_command() {
        let registry = CommandRegistry::new();
        registry.register_with("stub::Hi", stub("hi", "hello")).await;
        registry.reload().await.unwrap();
        let cmd = registry.resolve("hi").await.unwrap().instantiate();
        let msg = InboundMessage::stack("1", "u", "alice", "!bot hi", 1);
        assert_eq!(cmd.process(&msg, &[]).await.unwrap().as_deref(), Some("hello"));
    }
}
