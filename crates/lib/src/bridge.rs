//! The bridge: owns every piece of engine state and turns inbound messages into queued work.
//!
//! Stack messages go through the room's [`CommandRouter`]; Discord messages go through the
//! [`RelayMediator`]. Both run on the per-room queues so one room's messages are handled in
//! arrival order while different rooms proceed concurrently.

use crate::actions::DefaultAction;
use crate::channels::{InboundMessage, Network, RoomTransport, TransportRegistry};
use crate::commands::{register_builtin_commands, CommandRegistry};
use crate::config::{self, Config};
use crate::dispatch::RoomQueues;
use crate::filehost::{FileHost, GofileHost};
use crate::processors::{LearnedCommandProcessor, PriorityProcessor, ProcessorChain};
use crate::relay::{ChannelRoomMap, RelayMediator, RelayOutcome};
use crate::repository::{JsonFileRepository, Repository};
use crate::router::{CommandRouter, RouteOutcome};
use crate::session::{
    AuthHandle, RoomKey, RoomSession, SchedulerFactory, SessionRegistry, TransportSchedulerFactory,
    Watcher, WatcherRegistry,
};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Behavior knobs taken from config.
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub trigger: String,
    pub require_trigger: bool,
    pub unknown_command_hint: bool,
    pub stack_host: String,
    pub send_interval: Duration,
    pub idle_timeout: Option<Duration>,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for BridgeOptions {
    fn from(config: &Config) -> Self {
        Self {
            trigger: config.bot.trigger.clone(),
            require_trigger: config.bot.require_trigger,
            unknown_command_hint: config.bot.unknown_command_hint,
            stack_host: config.stack.host.clone(),
            send_interval: config.stack.send_interval(),
            idle_timeout: config.sessions.idle_timeout(),
        }
    }
}

/// How the bridge handled one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    Routed(RouteOutcome),
    Relayed(RelayOutcome),
    /// Bot-authored, or no transport to act on it.
    Ignored,
}

pub struct Bridge {
    options: BridgeOptions,
    registry: Arc<CommandRegistry>,
    chain: Arc<ProcessorChain>,
    sessions: Arc<SessionRegistry>,
    watchers: Arc<WatcherRegistry>,
    transports: TransportRegistry,
    factory: Arc<dyn SchedulerFactory>,
    relay: RelayMediator,
    routers: Mutex<HashMap<String, Arc<CommandRouter>>>,
    queues: RoomQueues,
}

impl Bridge {
    /// `stack` is the transport every Stack room session sends through. Other networks'
    /// transports are added with [`Bridge::register_transport`].
    pub async fn new(
        options: BridgeOptions,
        registry: Arc<CommandRegistry>,
        chain: ProcessorChain,
        stack: Arc<dyn RoomTransport>,
        channel_map: ChannelRoomMap,
    ) -> Arc<Self> {
        let sessions = Arc::new(SessionRegistry::new());
        let watchers = Arc::new(WatcherRegistry::new());
        let factory: Arc<dyn SchedulerFactory> = Arc::new(TransportSchedulerFactory::new(
            stack.clone(),
            options.send_interval,
        ));
        let transports = TransportRegistry::new();
        transports.register(stack).await;
        let relay = RelayMediator::new(
            channel_map,
            sessions.clone(),
            watchers.clone(),
            factory.clone(),
        );
        Arc::new(Self {
            options,
            registry,
            chain: Arc::new(chain),
            sessions,
            watchers,
            transports,
            factory,
            relay,
            routers: Mutex::new(HashMap::new()),
            queues: RoomQueues::new(),
        })
    }

    /// Build a bridge from config: JSON file repository, built-in commands (plus `paste` when the
    /// file host is enabled), learned-command processor, and the configured rooms pre-watched.
    /// Fails when the initial command reload reports a conflict.
    pub async fn from_config(config: &Config, stack: Arc<dyn RoomTransport>) -> Result<Arc<Self>> {
        let repository: Arc<dyn Repository> =
            Arc::new(JsonFileRepository::new(config::resolve_repository_path(config)));
        let file_host: Option<Arc<dyn FileHost>> = if config.file_host.enabled {
            Some(Arc::new(GofileHost::new(
                config.file_host.api_base.clone(),
                config.file_host.file_name.clone(),
            )))
        } else {
            None
        };

        let registry = Arc::new(CommandRegistry::new());
        register_builtin_commands(&registry, repository.clone(), file_host).await;
        let loaded = registry.reload().await.context("loading commands")?;
        log::info!("{} command(s) loaded", loaded);

        let mut chain = ProcessorChain::new();
        chain.register(Arc::new(LearnedCommandProcessor::new(
            config.bot.trigger.clone(),
            repository,
        )));

        let bridge = Self::new(
            BridgeOptions::from(config),
            registry,
            chain,
            stack,
            ChannelRoomMap::from(&config.discord.channel_map),
        )
        .await;
        for room in &config.stack.rooms {
            bridge.watch_room(room).await;
        }
        Ok(bridge)
    }

    pub async fn register_transport(&self, transport: Arc<dyn RoomTransport>) {
        self.transports.register(transport).await;
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn watchers(&self) -> &Arc<WatcherRegistry> {
        &self.watchers
    }

    fn stack_auth(&self) -> AuthHandle {
        AuthHandle::new(self.options.stack_host.clone(), None)
    }

    /// Record read presence in a Stack room. Returns false when it was already watched.
    pub async fn watch_room(&self, room_id: &str) -> bool {
        self.watchers
            .watch(Watcher {
                room_id: room_id.to_string(),
                auth: self.stack_auth(),
            })
            .await
    }

    /// Queue a message behind earlier messages of the same room and return immediately.
    /// Bot-authored messages and Discord messages from unmapped channels are dropped here.
    pub async fn on_message(self: &Arc<Self>, message: InboundMessage) {
        if message.author_is_bot {
            return;
        }
        if message.network == Network::Discord
            && self.relay.map().room_for(&message.room_name).is_none()
        {
            log::debug!("#{} is not mapped to a Stack room; dropping", message.room_name);
            return;
        }
        let key = RoomKey::new(message.network, message.room_id.clone());
        let bridge = self.clone();
        self.queues
            .dispatch(
                key,
                Box::pin(async move {
                    bridge.handle(message).await;
                }),
            )
            .await;
    }

    /// Rooms and channels with a live queue.
    pub async fn queued_rooms(&self) -> Vec<RoomKey> {
        self.queues.rooms().await
    }

    /// Handle one message now, bypassing the room queue.
    pub async fn handle(&self, message: InboundMessage) -> Handled {
        if message.author_is_bot {
            return Handled::Ignored;
        }
        match message.network {
            Network::StackExchange => Handled::Routed(self.handle_stack(&message).await),
            Network::Discord => self.handle_discord(&message).await,
        }
    }

    async fn handle_stack(&self, message: &InboundMessage) -> RouteOutcome {
        log::debug!("[SO {}] {}: {}", message.room_id, message.author_name, message.text);
        // Receiving a message from a room proves the Stack side is in it.
        self.watch_room(&message.room_id).await;
        let router = self.router_for(&message.room_id).await;
        let outcome = router.route(message).await;
        // Lookup refreshes the idle clock, so a slow route does not count as idle time.
        self.sessions
            .get(&RoomKey::new(Network::StackExchange, message.room_id.clone()))
            .await;
        outcome
    }

    async fn handle_discord(&self, message: &InboundMessage) -> Handled {
        let source = match self.transports.get(Network::Discord).await {
            Ok(source) => source,
            Err(e) => {
                log::warn!("cannot relay from #{}: {}", message.room_name, e);
                return Handled::Ignored;
            }
        };
        match self.relay.relay(message, source.as_ref()).await {
            Ok(outcome) => Handled::Relayed(outcome),
            Err(e) => {
                log::warn!("relay from #{} failed: {}", message.room_name, e);
                Handled::Ignored
            }
        }
    }

    /// Router for a Stack room, bound to the room's current session. Rebuilt when the session
    /// it was built on has been replaced.
    async fn router_for(&self, room_id: &str) -> Arc<CommandRouter> {
        let session = self.session_for(room_id).await;
        let mut routers = self.routers.lock().await;
        if let Some(router) = routers.get(room_id) {
            if Arc::ptr_eq(router.scheduler(), &session.scheduler) {
                return router.clone();
            }
        }
        let default_action = if self.options.unknown_command_hint {
            DefaultAction::UnknownCommandHint {
                trigger: self.options.trigger.clone(),
            }
        } else {
            DefaultAction::Ignore
        };
        let mut router = CommandRouter::new(
            self.registry.clone(),
            Arc::new(PriorityProcessor::new(room_id, self.options.trigger.clone())),
            self.chain.clone(),
            session.scheduler.clone(),
        )
        .with_default_action(default_action);
        if self.options.require_trigger {
            router = router.with_trigger(self.options.trigger.clone());
        }
        let router = Arc::new(router);
        routers.insert(room_id.to_string(), router.clone());
        router
    }

    async fn session_for(&self, room_id: &str) -> Arc<RoomSession> {
        let watcher = Watcher {
            room_id: room_id.to_string(),
            auth: self.stack_auth(),
        };
        let factory = self.factory.clone();
        let (session, _) = self
            .sessions
            .get_or_create_with(RoomKey::new(Network::StackExchange, room_id), move |key| {
                RoomSession::new(key.clone(), watcher.auth.clone(), factory.open(&watcher))
            })
            .await;
        session
    }

    /// Reload the command table. On error the previous table stays active.
    pub async fn reload_commands(&self) -> Result<usize, crate::commands::RegistryError> {
        self.registry.reload().await
    }

    /// Evict sessions unused for `max_idle`, along with their routers and room queues. A room
    /// with queued or running work keeps its session. Idle Discord channel queues are closed too.
    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<RoomKey> {
        let mut evicted = Vec::new();
        for key in self.sessions.idle_keys(max_idle).await {
            // Queue closes before the session goes, so later jobs start on a fresh worker.
            if !self.queues.close_if_idle(&key).await {
                log::debug!("{} is idle but has queued work; keeping it", key);
                continue;
            }
            if self.sessions.remove_if_idle(&key, max_idle).await {
                self.routers.lock().await.remove(&key.room_id);
                evicted.push(key);
            }
        }
        let closed = self.queues.close_idle_on(Network::Discord).await;
        if !closed.is_empty() {
            log::debug!("closed {} idle Discord channel queue(s)", closed.len());
        }
        evicted
    }

    /// Start the periodic idle sweep when an idle timeout is configured.
    pub fn spawn_idle_sweep(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let max_idle = self.options.idle_timeout?;
        let period = (max_idle / 2).max(Duration::from_secs(1));
        let bridge = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.tick().await;
            loop {
                tick.tick().await;
                let Some(bridge) = bridge.upgrade() else {
                    break;
                };
                let evicted = bridge.evict_idle(max_idle).await;
                if !evicted.is_empty() {
                    log::info!("evicted {} idle session(s)", evicted.len());
                }
            }
        }))
    }
}
