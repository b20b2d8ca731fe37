//! Errors raised while loading `~/.mcp-tool-host/config.json` (or the file
//! named on the command line).
//!
//! Protocol, registry and scheduler errors live next to the code that raises
//! them (see [`crate::mcp::error`] and [`crate::timer::TimerError`]).

use std::path::PathBuf;

use thiserror::Error;

/// Why the host could not start from its configuration.
///
/// Every variant is fatal: `main` prints it and exits before the MCP loop
/// starts, so nothing here ever reaches a client.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but reading it failed.
    #[error("cannot read config {path}")]
    ReadError {
        /// File that was being read.
        path: PathBuf,
        /// Cause reported by the OS.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid config document, including unknown keys.
    #[error("invalid config JSON in {path}")]
    ParseError {
        /// File that was being parsed.
        path: PathBuf,
        /// Position and cause from `serde_json`.
        #[source]
        source: serde_json::Error,
    },

    /// A config path was given explicitly and does not exist.
    ///
    /// A missing default file is not an error; defaults are used instead.
    #[error("config file {path} does not exist")]
    NotFound {
        /// The path passed as `CONFIG_FILE`.
        path: PathBuf,
    },

    /// A field holds a value the server cannot run with, such as a zero
    /// `tools.list_max_bytes` or a `timer.default_delay_secs` above the
    /// maximum.
    #[error("invalid config: {message}")]
    ValidationError {
        /// Names the offending field and the accepted range.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn missing_explicit_file_names_the_path() {
        let error = ConfigError::NotFound {
            path: PathBuf::from("/etc/mcp-tool-host/robot.json"),
        };
        assert_eq!(
            error.to_string(),
            "config file /etc/mcp-tool-host/robot.json does not exist"
        );
    }

    #[test]
    fn validation_message_names_the_field() {
        let error = ConfigError::ValidationError {
            message: "timer.default_delay_secs must be between 1 and 3600".to_string(),
        };
        assert!(error.to_string().starts_with("invalid config: timer.default_delay_secs"));
    }

    #[test]
    fn parse_error_keeps_serde_cause() {
        let source = serde_json::from_str::<serde_json::Value>("{\"timer\": ").unwrap_err();
        let error = ConfigError::ParseError {
            path: PathBuf::from("config.json"),
            source,
        };
        assert_eq!(error.to_string(), "invalid config JSON in config.json");
        assert!(error.source().is_some());
    }
}
