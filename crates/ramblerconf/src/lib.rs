//! Minimal configuration loading for Rambler.
//!
//! Kept free of runtime dependencies so the core player can import it
//! without pulling anything else in.
//!
//! # Usage
//!
//! ```rust,no_run
//! use ramblerconf::RamblerConfig;
//!
//! let config = RamblerConfig::load().expect("Failed to load config");
//! println!("log level: {}", config.telemetry.log_level);
//! println!("triggers: {}", config.player.react_to_triggers);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/rambler/config.toml` (system)
//! 2. `~/.config/rambler/config.toml` (user)
//! 3. `./rambler.toml` (local override)
//! 4. Environment variables (`RAMBLER_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [player]
//! log_navigation = true
//! react_to_triggers = true
//! react_to_listener = false
//!
//! [scheduler]
//! object_delay_ms = 50
//!
//! [telemetry]
//! log_level = "debug"
//! ```

pub mod loader;
pub mod settings;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use settings::{PlayerSettings, SchedulerSettings, TelemetryConfig};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete Rambler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RamblerConfig {
    #[serde(default)]
    pub player: PlayerSettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl RamblerConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./rambler.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = RamblerConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            config = loader::overlay_file(config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# Rambler Configuration\n\n");

        output.push_str("[player]\n");
        output.push_str(&format!("log_navigation = {}\n", self.player.log_navigation));
        output.push_str(&format!(
            "react_to_triggers = {}\n",
            self.player.react_to_triggers
        ));
        output.push_str(&format!(
            "react_to_listener = {}\n",
            self.player.react_to_listener
        ));

        output.push_str("\n[scheduler]\n");
        output.push_str(&format!(
            "object_delay_ms = {}\n",
            self.scheduler.object_delay_ms
        ));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = \"{}\"\n", self.telemetry.log_level));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RamblerConfig::default();
        assert_eq!(config.scheduler.object_delay_ms, 20);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_to_toml_round_trips() {
        let mut config = RamblerConfig::default();
        config.player.log_navigation = true;
        config.scheduler.object_delay_ms = 75;

        let toml = config.to_toml();
        assert!(toml.contains("[player]"));
        assert!(toml.contains("[scheduler]"));

        let parsed: RamblerConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, config);
    }
}
