//! Tool registry.
//!
//! A [`Tool`] binds a name, a description, an argument schema and an async
//! handler. Tools are immutable once built and cheap to clone, so lookups hand
//! out clones and never hold the registry lock across a callback.
//!
//! The [`ToolRegistry`] keeps tools in registration order. That order drives
//! `tools/list` pagination: a page starts at the cursor tool and stops before
//! the first tool that would push the page past its byte budget, whose name
//! becomes the next cursor.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::mcp::error::{CallError, RegistryError, ToolError};
use crate::mcp::protocol::{ToolCallResult, ToolDefinition};
use crate::mcp::schema::{Arguments, Property, PropertyList, PropertyValue};

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a tool handler resolves to.
pub type ToolResult = Result<PropertyValue, ToolError>;

/// A type-erased async tool handler.
pub type ToolCallback = Arc<dyn Fn(Arguments) -> BoxFuture<'static, ToolResult> + Send + Sync>;

struct ToolInner {
    name: String,
    description: String,
    schema: PropertyList,
    callback: ToolCallback,
}

/// A registered, invocable tool.
#[derive(Clone)]
pub struct Tool {
    inner: Arc<ToolInner>,
}

impl Tool {
    /// Starts building a tool with the given name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ToolBuilder {
        ToolBuilder::new(name)
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the tool description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.inner.description
    }

    /// Returns the argument schema.
    #[must_use]
    pub fn schema(&self) -> &PropertyList {
        &self.inner.schema
    }

    /// Returns the descriptor advertised by `tools/list`.
    #[must_use]
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.inner.name.clone(),
            description: self.inner.description.clone(),
            input_schema: self.inner.schema.to_schema_json(),
        }
    }

    /// Validates `arguments`, runs the handler and wraps the outcome.
    ///
    /// Never fails: validation and handler errors become `isError: true`.
    pub async fn invoke(&self, arguments: &Value) -> ToolCallResult {
        let args = match self.inner.schema.validate_and_fill(arguments) {
            Ok(args) => args,
            Err(e) => {
                tracing::warn!(tool = %self.name(), error = %e, "Rejected tool arguments");
                return ToolCallResult::error(e.to_string());
            }
        };

        match (self.inner.callback)(args).await {
            Ok(value) => ToolCallResult::text(value.to_string()),
            Err(e) => {
                tracing::error!(
                    tool = %self.name(),
                    arguments = %arguments,
                    error = %e,
                    "Tool call failed"
                );
                ToolCallResult::error(e.to_string())
            }
        }
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.inner.name)
            .field("description", &self.inner.description)
            .field("schema", &self.inner.schema)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Tool`].
pub struct ToolBuilder {
    name: String,
    description: String,
    properties: Vec<Property>,
    callback: Option<ToolCallback>,
}

impl ToolBuilder {
    /// Creates a builder for a tool called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            properties: Vec::new(),
            callback: None,
        }
    }

    /// Sets the description shown to the client.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declares an argument.
    #[must_use]
    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// Sets the async handler.
    #[must_use]
    pub fn handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        self.callback = Some(Arc::new(move |args| Box::pin(handler(args))));
        self
    }

    /// Validates and builds the tool.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, no handler was set, or the
    /// argument schema is inconsistent.
    pub fn build(self) -> Result<Tool, RegistryError> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let callback = self
            .callback
            .ok_or_else(|| RegistryError::MissingCallback {
                name: self.name.clone(),
            })?;
        let schema = PropertyList::from_properties(self.properties).map_err(|source| {
            RegistryError::InvalidSchema {
                name: self.name.clone(),
                source,
            }
        })?;

        Ok(Tool {
            inner: Arc::new(ToolInner {
                name: self.name,
                description: self.description,
                schema,
                callback,
            }),
        })
    }
}

/// One page of `tools/list` output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPage {
    /// Tool descriptors in registration order.
    pub tools: Vec<ToolDefinition>,
    /// Name of the first tool on the next page, if any remain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Insertion-ordered set of tools, shared by the dispatcher and the timer
/// service.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<IndexMap<String, Tool>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<String, Tool>> {
        self.tools.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<String, Tool>> {
        self.tools.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a tool.
    ///
    /// A second tool under an existing name is ignored with a warning, so
    /// re-registration sweeps are idempotent. Returns whether the tool was
    /// added.
    pub fn register(&self, tool: Tool) -> bool {
        let mut tools = self.write();
        if tools.contains_key(tool.name()) {
            tracing::warn!(tool = %tool.name(), "Tool already registered, ignoring duplicate");
            return false;
        }
        tracing::debug!(tool = %tool.name(), "Registered tool");
        tools.insert(tool.name().to_string(), tool);
        true
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Tool> {
        self.read().get(name).cloned()
    }

    /// Removes every tool, ahead of a full reload.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Tool names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Returns the page of descriptors starting at `cursor`.
    ///
    /// An empty or unknown cursor starts from the first tool. Each entry
    /// costs its encoded size plus `entry_overhead` bytes against
    /// `max_bytes`. A page always holds at least one tool when any remain,
    /// even if that tool alone exceeds the budget.
    #[must_use]
    pub fn list(&self, cursor: &str, max_bytes: usize, entry_overhead: usize) -> ToolPage {
        let tools = self.read();

        let start = if cursor.is_empty() {
            0
        } else {
            tools.get_index_of(cursor).unwrap_or_else(|| {
                tracing::warn!(cursor, "Unknown tools/list cursor, starting from the beginning");
                0
            })
        };

        let mut page = Vec::new();
        let mut used = 0usize;
        let mut next_cursor = None;

        for tool in tools.values().skip(start) {
            let definition = tool.definition();
            let cost = serde_json::to_vec(&definition).map_or(0, |v| v.len()) + entry_overhead;

            if !page.is_empty() && used + cost > max_bytes {
                next_cursor = Some(tool.name().to_string());
                break;
            }

            used += cost;
            page.push(definition);
        }

        ToolPage {
            tools: page,
            next_cursor,
        }
    }

    /// The `tools/call` path shared by the dispatcher and deferred timers.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool is unknown or `arguments` is neither an
    /// object nor `null`. Argument validation and handler failures are
    /// reported inside the returned [`ToolCallResult`] instead.
    pub async fn call(&self, name: &str, arguments: &Value) -> Result<ToolCallResult, CallError> {
        if !(arguments.is_object() || arguments.is_null()) {
            return Err(CallError::InvalidArguments);
        }

        let tool = self.lookup(name).ok_or_else(|| CallError::UnknownTool {
            name: name.to_string(),
        })?;

        tracing::info!(tool = %name, "Calling tool");
        Ok(tool.invoke(arguments).await)
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
