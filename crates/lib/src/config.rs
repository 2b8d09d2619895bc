//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (`~/.stackcord/config.json` unless overridden) and
//! environment. Secrets from env override the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP control plane.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Command trigger and fallback behavior.
    #[serde(default)]
    pub bot: BotConfig,

    #[serde(default)]
    pub stack: StackConfig,

    #[serde(default)]
    pub discord: DiscordConfig,

    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub file_host: FileHostConfig,

    #[serde(default)]
    pub sessions: SessionsConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for the HTTP control plane (default 15152).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    15152
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    /// First token of every command message (default "!bot"). Compared case-insensitively.
    #[serde(default = "default_trigger")]
    pub trigger: String,

    /// When true, messages not starting with the trigger never reach native commands.
    #[serde(default = "default_true")]
    pub require_trigger: bool,

    /// Reply "I don't know the command" when a triggered message is not claimed.
    #[serde(default = "default_true")]
    pub unknown_command_hint: bool,
}

fn default_trigger() -> String {
    "!bot".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            trigger: default_trigger(),
            require_trigger: true,
            unknown_command_hint: true,
        }
    }
}

/// Stack chat side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackConfig {
    /// Chat host the bot is logged into (default "chat.stackoverflow.com").
    #[serde(default = "default_stack_host")]
    pub host: String,

    /// Base URL of the chat sidecar. Overridden by STACKCORD_SIDECAR_URL env when set.
    pub sidecar_url: Option<String>,

    /// Rooms watched from startup.
    #[serde(default)]
    pub rooms: Vec<String>,

    /// Minimum gap between two sends to the same room, in milliseconds (default 1500).
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,
}

fn default_stack_host() -> String {
    "chat.stackoverflow.com".to_string()
}

fn default_send_interval_ms() -> u64 {
    1500
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            host: default_stack_host(),
            sidecar_url: None,
            rooms: Vec::new(),
            send_interval_ms: default_send_interval_ms(),
        }
    }
}

impl StackConfig {
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordConfig {
    /// Bot token. Overridden by DISCORD_BOT_TOKEN env when set.
    pub bot_token: Option<String>,

    /// Discord channel name → Stack room id.
    #[serde(default)]
    pub channel_map: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    /// JSON document store (default ~/.stackcord/repository.json).
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHostConfig {
    /// Enables the `paste` command. Default: false.
    #[serde(default)]
    pub enabled: bool,

    /// File name given to uploads (default "paste.txt").
    #[serde(default = "default_file_name")]
    pub file_name: String,

    /// Base URL of the gofile API (default "https://apiv2.gofile.io").
    #[serde(default = "default_file_host_api_base")]
    pub api_base: String,
}

fn default_file_name() -> String {
    "paste.txt".to_string()
}

fn default_file_host_api_base() -> String {
    "https://apiv2.gofile.io".to_string()
}

impl Default for FileHostConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            file_name: default_file_name(),
            api_base: default_file_host_api_base(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsConfig {
    /// Evict room sessions unused for this long. Omit to keep sessions for the process lifetime.
    pub idle_timeout_secs: Option<u64>,
}

impl SessionsConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the Discord bot token: env DISCORD_BOT_TOKEN overrides config.
pub fn resolve_discord_token(config: &Config) -> Option<String> {
    non_empty_env("DISCORD_BOT_TOKEN").or_else(|| non_empty(config.discord.bot_token.as_ref()))
}

/// Resolve the Stack sidecar base URL: env STACKCORD_SIDECAR_URL overrides config.
pub fn resolve_sidecar_url(config: &Config) -> Option<String> {
    non_empty_env("STACKCORD_SIDECAR_URL")
        .or_else(|| non_empty(config.stack.sidecar_url.as_ref()))
        .map(|s| s.trim_end_matches('/').to_string())
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

fn state_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".stackcord"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("STACKCORD_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| state_dir().join("config.json"))
}

/// Repository document path: `repository.path` if set, otherwise `~/.stackcord/repository.json`.
pub fn resolve_repository_path(config: &Config) -> PathBuf {
    config
        .repository
        .path
        .clone()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| state_dir().join("repository.json"))
}

/// Load config from the given path, or the default path (or STACKCORD_CONFIG_PATH). Missing
/// file => default config. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.gateway.port, 15152);
        assert_eq!(c.gateway.bind, "127.0.0.1");
        assert_eq!(c.bot.trigger, "!bot");
        assert!(c.bot.require_trigger);
        assert!(c.bot.unknown_command_hint);
        assert_eq!(c.stack.host, "chat.stackoverflow.com");
        assert_eq!(c.stack.send_interval(), Duration::from_millis(1500));
        assert!(!c.file_host.enabled);
        assert_eq!(c.file_host.file_name, "paste.txt");
        assert_eq!(c.file_host.api_base, "https://apiv2.gofile.io");
        assert_eq!(c.sessions.idle_timeout(), None);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c: Config = serde_json::from_str(
            r#"{
                "bot": { "trigger": "!!" },
                "stack": { "rooms": ["1", "2"], "sendIntervalMs": 0 },
                "discord": { "channelMap": { "general": "17" } },
                "sessions": { "idleTimeoutSecs": 600 }
            }"#,
        )
        .unwrap();
        assert_eq!(c.bot.trigger, "!!");
        assert!(c.bot.require_trigger);
        assert_eq!(c.stack.rooms, vec!["1", "2"]);
        assert_eq!(c.stack.send_interval(), Duration::ZERO);
        assert_eq!(c.discord.channel_map.get("general").map(String::as_str), Some("17"));
        assert_eq!(c.sessions.idle_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(c.gateway.port, 15152);
    }

    #[test]
    fn zero_idle_timeout_means_never() {
        let s = SessionsConfig {
            idle_timeout_secs: Some(0),
        };
        assert_eq!(s.idle_timeout(), None);
    }

    #[test]
    fn repository_path_override() {
        let mut c = Config::default();
        c.repository.path = Some(PathBuf::from("/var/lib/stackcord/repo.json"));
        assert_eq!(
            resolve_repository_path(&c),
            PathBuf::from("/var/lib/stackcord/repo.json")
        );
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let path = std::env::temp_dir().join(format!("stackcord-missing-{}.json", uuid::Uuid::new_v4()));
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.gateway.port, 15152);
    }

    #[test]
    fn loopback_binds() {
        assert!(is_loopback_bind("127.0.0.1"));
        assert!(is_loopback_bind(" localhost "));
        assert!(!is_loopback_bind("0.0.0.0"));
    }
}
