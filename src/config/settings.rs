//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use serde::Deserialize;

use crate::error::ConfigError;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Server identity settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Tool catalogue settings.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Deferred execution settings.
    #[serde(default)]
    pub timer: TimerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.name.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "server.name cannot be empty".to_string(),
            });
        }

        if self.tools.list_max_bytes == 0 {
            return Err(ConfigError::ValidationError {
                message: "tools.list_max_bytes must be greater than 0".to_string(),
            });
        }

        if self.timer.max_delay_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "timer.max_delay_secs must be at least 1".to_string(),
            });
        }

        if self.timer.default_delay_secs == 0
            || self.timer.default_delay_secs > self.timer.max_delay_secs
        {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "timer.default_delay_secs must be between 1 and {}",
                    self.timer.max_delay_secs
                ),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            });
        }

        Ok(())
    }
}

/// Server identity reported during `initialize`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Name reported in `serverInfo`.
    #[serde(default = "default_server_name")]
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
        }
    }
}

fn default_server_name() -> String {
    crate::mcp::protocol::SERVER_NAME.to_string()
}

/// Tool catalogue settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Byte budget for a single `tools/list` page.
    #[serde(default = "default_list_max_bytes")]
    pub list_max_bytes: usize,

    /// Per-entry allowance for envelope punctuation when paging.
    #[serde(default = "default_list_entry_overhead")]
    pub list_entry_overhead: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            list_max_bytes: default_list_max_bytes(),
            list_entry_overhead: default_list_entry_overhead(),
        }
    }
}

const fn default_list_max_bytes() -> usize {
    8000
}

const fn default_list_entry_overhead() -> usize {
    100
}

/// Deferred execution settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimerConfig {
    /// Delay substituted when a countdown asks for an invalid one.
    #[serde(default = "default_delay_secs")]
    pub default_delay_secs: u64,

    /// Longest accepted countdown delay.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            default_delay_secs: default_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

const fn default_delay_secs() -> u64 {
    5
}

const fn default_max_delay_secs() -> u64 {
    3600
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
