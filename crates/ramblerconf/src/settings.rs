//! Settings sections - player behaviour, dummy scheduler timing, telemetry.

use serde::{Deserialize, Serialize};

/// How the multi-session player reacts to the outside world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSettings {
    /// Emit navigator output at info level instead of debug.
    /// Default: false
    #[serde(default)]
    pub log_navigation: bool,

    /// Start/stop sessions when a node's play trigger parameter changes.
    /// Default: true
    #[serde(default = "PlayerSettings::default_true")]
    pub react_to_triggers: bool,

    /// Forward listener pose parameter changes to the scheduler.
    /// Default: true
    #[serde(default = "PlayerSettings::default_true")]
    pub react_to_listener: bool,
}

impl PlayerSettings {
    fn default_true() -> bool {
        true
    }
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            log_navigation: false,
            react_to_triggers: true,
            react_to_listener: true,
        }
    }
}

/// Timing for the timer-driven dummy scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Delay before an object starts, and how long it lasts.
    /// Default: 20
    #[serde(default = "SchedulerSettings::default_object_delay_ms")]
    pub object_delay_ms: u64,
}

impl SchedulerSettings {
    fn default_object_delay_ms() -> u64 {
        20
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            object_delay_ms: Self::default_object_delay_ms(),
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level or filter directive (trace, debug, info, warn, error).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_defaults() {
        let settings = PlayerSettings::default();
        assert!(!settings.log_navigation);
        assert!(settings.react_to_triggers);
        assert!(settings.react_to_listener);
    }

    #[test]
    fn test_partial_section_uses_field_defaults() {
        let settings: PlayerSettings = toml::from_str("log_navigation = true").unwrap();
        assert!(settings.log_navigation);
        assert!(settings.react_to_triggers);
    }
}
