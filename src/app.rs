//! Application context.
//!
//! Owns the tool registry, the timer service and the dispatcher for the
//! lifetime of the process. Nothing here is global: the binary builds one
//! [`App`] at startup and calls [`App::shutdown`] when the server loop ends.

use std::sync::Arc;

use serde_json::Value;

use crate::config::Config;
use crate::mcp::error::RegistryError;
use crate::mcp::protocol::OutgoingNotification;
use crate::mcp::registry::ToolRegistry;
use crate::mcp::server::{McpServer, ServerSettings};
use crate::mcp::transport::{SendFn, StdioTransport};
use crate::timer::{log_notifier, register_timer_tools, Notifier, TimerService, TimerSettings};
use crate::tools::register_builtin_tools;

/// The running application.
pub struct App {
    registry: Arc<ToolRegistry>,
    timers: TimerService,
    server: McpServer,
}

impl App {
    /// Builds the application and registers all tools.
    ///
    /// With a `sender`, replies go to the client and timer outcomes are
    /// pushed as `notifications/message`; without one, both are only logged.
    ///
    /// # Errors
    ///
    /// Returns an error if a tool definition is inconsistent.
    pub fn new(config: &Config, sender: Option<SendFn>) -> Result<Self, RegistryError> {
        let registry = Arc::new(ToolRegistry::new());

        let notifier = sender
            .clone()
            .map_or_else(log_notifier, notification_notifier);
        let timers =
            TimerService::with_notifier(&registry, TimerSettings::from(&config.timer), notifier);

        let settings = ServerSettings {
            name: config.server.name.clone(),
            list_max_bytes: config.tools.list_max_bytes,
            list_entry_overhead: config.tools.list_entry_overhead,
        };
        let mut server = McpServer::new(Arc::clone(&registry), settings);
        if let Some(sender) = sender {
            server.set_sender(sender);
        }

        let app = Self {
            registry,
            timers,
            server,
        };
        app.register_tools()?;

        tracing::info!(tools = app.registry.len(), "Tools registered");
        Ok(app)
    }

    fn register_tools(&self) -> Result<(), RegistryError> {
        register_builtin_tools(&self.registry)?;
        register_timer_tools(&self.registry, &self.timers)?;
        Ok(())
    }

    /// Clears the registry and registers every tool again.
    ///
    /// # Errors
    ///
    /// Returns an error if a tool definition is inconsistent.
    pub fn reload_tools(&self) -> Result<(), RegistryError> {
        self.registry.clear();
        self.register_tools()
    }

    /// Returns the tool registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Returns the timer service.
    #[must_use]
    pub const fn timers(&self) -> &TimerService {
        &self.timers
    }

    /// Returns the dispatcher.
    #[must_use]
    pub const fn server(&self) -> &McpServer {
        &self.server
    }

    /// Serves requests from `transport` until it closes or a shutdown
    /// signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&self, transport: &mut StdioTransport) -> std::io::Result<()> {
        self.server.run(transport).await
    }

    /// Cancels outstanding countdowns. Returns how many were dropped.
    pub fn shutdown(self) -> usize {
        self.timers.cleanup_all()
    }
}

/// Reports timer outcomes to the client as MCP log messages, and logs them.
fn notification_notifier(send: SendFn) -> Notifier {
    let log = log_notifier();
    Arc::new(move |notice| {
        let send = Arc::clone(&send);
        let log = Arc::clone(&log);
        Box::pin(async move {
            let level = if notice.success { "info" } else { "error" };
            let data = serde_json::to_value(&notice).unwrap_or(Value::Null);
            let message = OutgoingNotification::log_message(level, "timer", data);

            match serde_json::to_string(&message) {
                Ok(payload) => send(payload).await,
                Err(e) => tracing::error!(error = %e, "Failed to serialise timer notification"),
            }
            log(notice).await;
        })
    })
}
