//! Gateway HTTP server (single port).

use crate::bridge::Bridge;
use crate::channels::{ConsoleTransport, InboundMessage, MessageId, Network, RoomTransport, SidecarTransport};
use crate::config::{self, Config};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const INBOUND_QUEUE_DEPTH: usize = 256;

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub port: u16,
    pub bridge: Arc<Bridge>,
    /// Inbound messages from every network; the dispatcher task hands them to the bridge.
    pub inbound_tx: mpsc::Sender<InboundMessage>,
}

/// Body of `POST /stack/events`: one message the sidecar saw in a Stack room.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackEvent {
    pub room_id: String,
    pub author_id: String,
    pub author_name: String,
    pub text: String,
    pub message_id: MessageId,
    /// Set when the bot account itself wrote the message.
    #[serde(default)]
    pub is_own: bool,
}

impl From<StackEvent> for InboundMessage {
    fn from(event: StackEvent) -> Self {
        let mut message = InboundMessage::stack(
            event.room_id,
            event.author_id,
            event.author_name,
            event.text,
            event.message_id,
        );
        message.author_is_bot = event.is_own;
        message
    }
}

/// Body of `POST /stack/watch`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRequest {
    pub room_id: String,
}

/// Routes without the listener, for embedding and tests.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/stack/events", post(stack_event))
        .route("/stack/watch", post(stack_watch))
        .route("/commands/reload", post(reload_commands))
        .with_state(state)
}

fn stack_transport(config: &Config) -> Arc<dyn RoomTransport> {
    match config::resolve_sidecar_url(config) {
        Some(url) => {
            log::info!("stack transport: sidecar at {}", url);
            Arc::new(SidecarTransport::new(url))
        }
        None => {
            log::warn!("no stack.sidecarUrl configured; Stack output goes to stdout");
            Arc::new(ConsoleTransport::new(Network::StackExchange))
        }
    }
}

#[cfg(feature = "discord")]
async fn start_discord(
    config: &Config,
    bridge: &Arc<Bridge>,
    inbound_tx: mpsc::Sender<InboundMessage>,
) -> Option<JoinHandle<()>> {
    let token = config::resolve_discord_token(config)?;
    match crate::channels::start_discord(&token, inbound_tx).await {
        Ok((transport, handle)) => {
            bridge.register_transport(transport).await;
            log::info!("discord channel registered");
            Some(handle)
        }
        Err(e) => {
            log::warn!("discord connect failed: {:#}", e);
            None
        }
    }
}

#[cfg(not(feature = "discord"))]
async fn start_discord(
    config: &Config,
    _bridge: &Arc<Bridge>,
    _inbound_tx: mpsc::Sender<InboundMessage>,
) -> Option<JoinHandle<()>> {
    if config::resolve_discord_token(config).is_some() {
        log::warn!("discord token set but this build has no discord support; relay disabled");
    }
    None
}

/// Build the bridge from config, connect the networks and serve until SIGINT/SIGTERM.
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        log::warn!(
            "gateway bound to {} accepts unauthenticated control requests; keep it behind a firewall",
            bind
        );
    }

    let bridge = Bridge::from_config(&config, stack_transport(&config)).await?;
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<InboundMessage>(INBOUND_QUEUE_DEPTH);

    {
        let bridge = bridge.clone();
        tokio::spawn(async move {
            while let Some(msg) = inbound_rx.recv().await {
                bridge.on_message(msg).await;
            }
        });
    }

    let mut background: Vec<JoinHandle<()>> = Vec::new();
    if let Some(handle) = start_discord(&config, &bridge, inbound_tx.clone()).await {
        background.push(handle);
    }
    if let Some(handle) = bridge.spawn_idle_sweep() {
        background.push(handle);
    }

    let app = router(GatewayState {
        port: config.gateway.port,
        bridge,
        inbound_tx,
    });

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(background))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Stops background connectors before the server drains.
async fn shutdown_signal(background: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, stopping connectors");

    for h in background {
        h.abort();
    }
}

/// GET / returns a health JSON (for liveness checks).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let bridge = &state.bridge;
    let sessions = bridge.sessions().len().await;
    let watchers = bridge.watchers().rooms().await;
    let commands = bridge.registry().len().await;
    Json(json!({
        "runtime": "running",
        "port": state.port,
        "sessions": sessions,
        "watchers": watchers,
        "commands": commands,
    }))
}

/// POST /stack/events queues one Stack chat message.
async fn stack_event(State(state): State<GatewayState>, Json(event): Json<StackEvent>) -> StatusCode {
    if state.inbound_tx.send(event.into()).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::ACCEPTED
}

/// POST /stack/watch records that the sidecar joined a room.
async fn stack_watch(
    State(state): State<GatewayState>,
    Json(req): Json<WatchRequest>,
) -> Response {
    let room = req.room_id.trim();
    if room.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": "roomId is required" })),
        )
            .into_response();
    }
    let added = state.bridge.watch_room(room).await;
    Json(json!({ "ok": true, "added": added })).into_response()
}

/// POST /commands/reload swaps in a fresh command table, or reports the conflict.
async fn reload_commands(State(state): State<GatewayState>) -> Response {
    match state.bridge.reload_commands().await {
        Ok(n) => Json(json!({ "ok": true, "commands": n })).into_response(),
        Err(e) => {
            log::warn!("command reload rejected: {}", e);
            (
                StatusCode::CONFLICT,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
