//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, RamblerConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli). Only returns
/// files that exist.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/rambler/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("rambler/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("rambler.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file and lay the values it sets over `base`.
pub fn overlay_file(base: RamblerConfig, path: &Path) -> Result<RamblerConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    overlay_toml(base, &contents, path)
}

/// Only keys present in `contents` replace values in `base`, so a user file
/// that sets one field does not reset what the system file configured.
fn overlay_toml(
    mut config: RamblerConfig,
    contents: &str,
    path: &Path,
) -> Result<RamblerConfig, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Some(player) = table.get("player").and_then(|v| v.as_table()) {
        if let Some(v) = player.get("log_navigation").and_then(|v| v.as_bool()) {
            config.player.log_navigation = v;
        }
        if let Some(v) = player.get("react_to_triggers").and_then(|v| v.as_bool()) {
            config.player.react_to_triggers = v;
        }
        if let Some(v) = player.get("react_to_listener").and_then(|v| v.as_bool()) {
            config.player.react_to_listener = v;
        }
    }

    if let Some(scheduler) = table.get("scheduler").and_then(|v| v.as_table()) {
        if let Some(v) = scheduler.get("object_delay_ms").and_then(|v| v.as_integer()) {
            if v < 0 {
                return Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    message: format!("scheduler.object_delay_ms must not be negative, got {v}"),
                });
            }
            config.scheduler.object_delay_ms = v as u64;
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.telemetry.log_level = v.to_string();
        }
    }

    Ok(config)
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut RamblerConfig, sources: &mut ConfigSources) {
    if let Some(v) = env_flag("RAMBLER_LOG_NAVIGATION") {
        config.player.log_navigation = v;
        sources.env_overrides.push("RAMBLER_LOG_NAVIGATION".to_string());
    }
    if let Some(v) = env_flag("RAMBLER_REACT_TO_TRIGGERS") {
        config.player.react_to_triggers = v;
        sources.env_overrides.push("RAMBLER_REACT_TO_TRIGGERS".to_string());
    }
    if let Some(v) = env_flag("RAMBLER_REACT_TO_LISTENER") {
        config.player.react_to_listener = v;
        sources.env_overrides.push("RAMBLER_REACT_TO_LISTENER".to_string());
    }

    if let Ok(v) = env::var("RAMBLER_OBJECT_DELAY_MS") {
        if let Ok(ms) = v.parse() {
            config.scheduler.object_delay_ms = ms;
            sources.env_overrides.push("RAMBLER_OBJECT_DELAY_MS".to_string());
        }
    }

    if let Ok(v) = env::var("RAMBLER_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RAMBLER_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Ok(v) = env::var("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name).ok().and_then(|v| parse_flag(&v))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
