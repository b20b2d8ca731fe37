//! mcp-tool-host: MCP server exposing schema-validated tools, with deferred
//! and cancellable tool execution.
//!
//! # Architecture
//!
//! Tools are registered once at startup. The orchestrator lists them with
//! `tools/list` and runs them with `tools/call`; any call can also be
//! scheduled to run later through the timer tools.
//!
//! - **Schema Model**: typed argument declarations, validation and defaults
//! - **Tool Registry**: named tools with paginated listing
//! - **Message Dispatcher**: JSON-RPC request routing and replies
//! - **Timer Service**: delayed tool calls re-entering the registry
//!
//! # Modules
//!
//! - [`app`] - Application context wiring everything together
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Configuration error types
//! - [`mcp`] - MCP protocol, schema, registry and dispatcher
//! - [`timer`] - Deferred execution scheduler and its tools
//! - [`tools`] - Built-in tools

pub mod app;
pub mod config;
pub mod error;
pub mod mcp;
pub mod timer;
pub mod tools;
