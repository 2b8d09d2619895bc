//! Initialize the configuration directory: create ~/.stackcord and a default config.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Default config written by `stackcord init`: every section at its default, plus an example
/// channel mapping so the file shows the expected shape.
pub fn default_config() -> Config {
    let mut config = Config::default();
    config.discord.channel_map = BTreeMap::from([("general".to_string(), "1".to_string())]);
    config
}

/// Create the config directory and default config if they do not exist. An existing config
/// file is left alone. Returns the config directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        let body = serde_json::to_string_pretty(&default_config())
            .context("serializing default config")?;
        std::fs::write(config_path, body)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, skipping", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;

    #[test]
    fn init_writes_loadable_config_once() {
        let dir = std::env::temp_dir().join(format!("stackcord-init-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");

        assert_eq!(init_config_dir(&path).unwrap(), dir);
        let (config, _) = load_config(Some(path.clone())).unwrap();
        assert_eq!(config.bot.trigger, "!bot");
        assert_eq!(
            config.discord.channel_map.get("general").map(String::as_str),
            Some("1")
        );

        std::fs::write(&path, r#"{"bot":{"trigger":"!x"}}"#).unwrap();
        init_config_dir(&path).unwrap();
        let (config, _) = load_config(Some(path)).unwrap();
        assert_eq!(config.bot.trigger, "!x");

        let _ = std::fs::remove_dir_all(dir);
    }
}
