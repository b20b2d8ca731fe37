//! Model Context Protocol (MCP) server implementation.
//!
//! This module exposes registered tools to an orchestrator over JSON-RPC 2.0
//! messages carried by the stdio transport.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         MCP Server                          │
//! │                                                             │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    │
//! │   │  Transport  │───▶│   Server    │───▶│  Registry   │    │
//! │   │   (stdio)   │    │ (dispatch)  │    │  + Schema   │    │
//! │   └─────────────┘    └─────────────┘    └─────────────┘    │
//! │          ▲                  │                  ▲            │
//! │          │                  ▼                  │            │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    │
//! │   │   SendFn    │◀───│   Replies   │    │   Timers    │    │
//! │   └─────────────┘    └─────────────┘    └─────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod error;
pub mod protocol;
pub mod registry;
pub mod schema;
pub mod server;
pub mod transport;

pub use error::{ArgumentError, CallError, RegistryError, SchemaError, ToolError};
pub use protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ToolCallResult, MCP_PROTOCOL_VERSION,
};
pub use registry::{BoxFuture, Tool, ToolBuilder, ToolPage, ToolRegistry, ToolResult};
pub use schema::{Arguments, Property, PropertyKind, PropertyList, PropertyValue};
pub use server::{CapabilityStore, McpServer, ServerSettings, VisionEndpoint};
pub use transport::{SendFn, StdioTransport};
