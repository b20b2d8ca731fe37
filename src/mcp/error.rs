//! Error types for the tool schema, registry and call path.

use thiserror::Error;

use crate::mcp::schema::PropertyKind;

/// Errors raised while declaring a tool's argument schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Two properties share a name.
    #[error("Duplicate property: {name}")]
    DuplicateProperty {
        /// The repeated property name.
        name: String,
    },

    /// A default value does not have the property's declared kind.
    #[error("Default for '{name}' must be {expected}")]
    DefaultKindMismatch {
        /// Property name.
        name: String,
        /// The declared kind.
        expected: PropertyKind,
    },

    /// An integer range with `min > max`.
    #[error("Invalid range for '{name}': {min} > {max}")]
    InvalidRange {
        /// Property name.
        name: String,
        /// Lower bound.
        min: i64,
        /// Upper bound.
        max: i64,
    },
}

/// Errors raised while validating call arguments against a schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    /// The arguments were not a JSON object.
    #[error("Arguments must be an object")]
    NotAnObject,

    /// A required argument was not supplied.
    #[error("Missing valid argument: {name}")]
    MissingArgument {
        /// Argument name.
        name: String,
    },

    /// An argument had the wrong JSON type.
    #[error("Invalid type for argument: {name} (expected {expected})")]
    TypeMismatch {
        /// Argument name.
        name: String,
        /// The declared kind.
        expected: PropertyKind,
    },

    /// An integer argument fell outside its declared range.
    #[error("Value is out of range for argument: {name} ({value} not in {min}..={max})")]
    RangeViolation {
        /// Argument name.
        name: String,
        /// The supplied value.
        value: i64,
        /// Lower bound.
        min: i64,
        /// Upper bound.
        max: i64,
    },
}

/// Errors a tool invocation can produce. Both end up as `isError: true`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Argument validation failed before the callback ran.
    #[error(transparent)]
    Arguments(#[from] ArgumentError),

    /// The tool's own implementation failed.
    #[error("{message}")]
    Failed {
        /// Failure description shown to the caller.
        message: String,
    },
}

impl ToolError {
    /// Creates a callback failure with the given message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Errors raised when building a [`Tool`](crate::mcp::registry::Tool).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The tool name is empty.
    #[error("Tool name cannot be empty")]
    EmptyName,

    /// No handler was supplied.
    #[error("Tool '{name}' has no handler")]
    MissingCallback {
        /// Tool name.
        name: String,
    },

    /// The argument schema is inconsistent.
    #[error("Tool '{name}' has an invalid schema: {source}")]
    InvalidSchema {
        /// Tool name.
        name: String,
        /// The schema problem.
        #[source]
        source: SchemaError,
    },
}

/// Errors from the shared `tools/call` path that never reach a callback.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The call did not name a tool.
    #[error("Missing tool name")]
    MissingName,

    /// No tool is registered under the name.
    #[error("Unknown tool: {name}")]
    UnknownTool {
        /// The requested name.
        name: String,
    },

    /// `arguments` was present but not an object.
    #[error("Invalid arguments")]
    InvalidArguments,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_error_display() {
        let error = ArgumentError::RangeViolation {
            name: "volume".to_string(),
            value: 120,
            min: 0,
            max: 100,
        };
        let msg = error.to_string();
        assert!(msg.contains("volume"));
        assert!(msg.contains("120"));
    }

    #[test]
    fn tool_error_is_transparent_over_arguments() {
        let error: ToolError = ArgumentError::MissingArgument {
            name: "text".to_string(),
        }
        .into();
        assert_eq!(error.to_string(), "Missing valid argument: text");
    }

    #[test]
    fn unknown_tool_display() {
        let error = CallError::UnknownTool {
            name: "self.nope".to_string(),
        };
        assert_eq!(error.to_string(), "Unknown tool: self.nope");
    }
}
