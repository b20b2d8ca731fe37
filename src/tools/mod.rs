//! Built-in tools.
//!
//! Device tools (camera, audio, motion, ...) are provided by their own
//! crates and registered through the same [`ToolRegistry`] contract. The
//! host itself only ships tools that need no hardware.

use crate::mcp::error::RegistryError;
use crate::mcp::registry::{Tool, ToolRegistry};
use crate::mcp::schema::{Property, PropertyValue};

/// Returns the `echo` tool: answers with its `text` argument unchanged.
///
/// # Errors
///
/// Returns an error only if the tool definition is inconsistent.
pub fn echo_tool() -> Result<Tool, RegistryError> {
    Tool::builder("echo")
        .description("Return the given text unchanged. Useful for testing connectivity and timers.")
        .property(Property::string("text"))
        .handler(|args| async move {
            Ok(PropertyValue::from(
                args.get_str("text").unwrap_or_default(),
            ))
        })
        .build()
}

/// Registers every built-in tool.
///
/// # Errors
///
/// Returns an error only if a tool definition is inconsistent.
pub fn register_builtin_tools(registry: &ToolRegistry) -> Result<(), RegistryError> {
    registry.register(echo_tool()?);
    Ok(())
}
