//! MCP message dispatcher.
//!
//! The server handles one inbound message at a time:
//!
//! 1. Parse it; malformed messages are dropped, or answered with an error
//!    when they carried a usable `id`
//! 2. Ignore notifications
//! 3. Route requests by method (`initialize`, `ping`, `tools/list`,
//!    `tools/call`)
//! 4. Answer through exactly one of two reply primitives: a result reply or
//!    an error reply, both delivered by the injected [`SendFn`]
//!
//! Apart from capability data received in `initialize`, nothing is kept
//! between messages. Tools are resolved in the shared [`ToolRegistry`].

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::mcp::error::CallError;
use crate::mcp::protocol::{
    parse_message, IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, ProtocolError, RequestId, MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::registry::ToolRegistry;
use crate::mcp::transport::{SendFn, StdioTransport};

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities. Serialises as `{}`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

/// Vision service endpoint announced by the client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VisionEndpoint {
    /// Service URL.
    pub url: String,
    /// Bearer token, if the service needs one.
    #[serde(default)]
    pub token: Option<String>,
}

/// Client capability block of the `initialize` request.
#[derive(Debug, Clone, Default, Deserialize)]
struct ClientCapabilities {
    #[serde(default)]
    vision: Option<VisionEndpoint>,
}

/// Capability data received from the client, readable by tool
/// implementations (a camera tool uploads to the vision endpoint, for
/// instance).
#[derive(Debug, Clone, Default)]
pub struct CapabilityStore {
    vision: Arc<RwLock<Option<VisionEndpoint>>>,
}

impl CapabilityStore {
    /// Returns the current vision endpoint.
    #[must_use]
    pub fn vision(&self) -> Option<VisionEndpoint> {
        self.vision
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_vision(&self, endpoint: VisionEndpoint) {
        *self.vision.write().unwrap_or_else(PoisonError::into_inner) = Some(endpoint);
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Name reported in `serverInfo`.
    pub name: String,
    /// Byte budget for one `tools/list` page.
    pub list_max_bytes: usize,
    /// Per-entry allowance added to each descriptor's size.
    pub list_entry_overhead: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            list_max_bytes: 8000,
            list_entry_overhead: 100,
        }
    }
}

/// The MCP message dispatcher.
pub struct McpServer {
    /// Tools available to `tools/list` and `tools/call`.
    registry: Arc<ToolRegistry>,
    /// Outbound channel; replies are dropped while unset.
    sender: Option<SendFn>,
    /// Dispatcher settings.
    settings: ServerSettings,
    /// Capabilities received in `initialize`.
    capabilities: CapabilityStore,
}

impl McpServer {
    /// Creates a dispatcher over `registry` with no outbound channel.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, settings: ServerSettings) -> Self {
        Self {
            registry,
            sender: None,
            settings,
            capabilities: CapabilityStore::default(),
        }
    }

    /// Sets the function used to deliver replies.
    #[must_use]
    pub fn with_sender(mut self, sender: SendFn) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Replaces the function used to deliver replies.
    pub fn set_sender(&mut self, sender: SendFn) {
        self.sender = Some(sender);
    }

    /// Returns the shared capability store.
    #[must_use]
    pub const fn capabilities(&self) -> &CapabilityStore {
        &self.capabilities
    }

    /// Returns the tool registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Runs the MCP server main loop with graceful shutdown handling.
    ///
    /// Returns when stdin closes or a termination signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&self, transport: &mut StdioTransport) -> std::io::Result<()> {
        self.run_with_shutdown(transport).await
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(unix)]
    async fn run_with_shutdown(&self, transport: &mut StdioTransport) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(std::io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(std::io::Error::other)?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    return Ok(());
                }

                line_result = transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(windows)]
    async fn run_with_shutdown(&self, transport: &mut StdioTransport) -> std::io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                    return Ok(());
                }

                line_result = transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Handles the result from transport read.
    ///
    /// Returns `true` if the server should shut down.
    async fn handle_transport_result(
        &self,
        line_result: std::io::Result<Option<String>>,
    ) -> std::io::Result<bool> {
        let Some(line) = line_result? else {
            tracing::info!("stdin closed");
            return Ok(true);
        };

        if !line.trim().is_empty() {
            self.handle_line(&line).await;
        }

        Ok(false)
    }

    /// Handles a single inbound message.
    ///
    /// Never fails: every problem becomes an error reply or a logged drop.
    pub async fn handle_line(&self, line: &str) {
        let message = match parse_message(line) {
            Ok(message) => message,
            Err(error) => return self.handle_protocol_error(error).await,
        };

        tracing::trace!(
            method = message.method(),
            id = ?message.id(),
            has_params = message.params().is_some(),
            "Received message"
        );

        match message {
            IncomingMessage::Request(req) => self.handle_request(req).await,
            IncomingMessage::Notification(ref notif) => Self::handle_notification(notif),
        }
    }

    /// Answers a malformed request when its id is known, otherwise drops it.
    async fn handle_protocol_error(&self, error: ProtocolError) {
        match error.id.clone() {
            Some(id) => {
                tracing::warn!(id = %id, error = %error, "Rejected malformed request");
                self.reply_error(id, error.message).await;
            }
            None => {
                tracing::error!(error = %error, "Dropping malformed message");
            }
        }
    }

    /// Handles an incoming request.
    async fn handle_request(&self, req: JsonRpcRequest) {
        tracing::debug!(id = %req.id, method = %req.method, "Handling request");

        match req.method.as_str() {
            "initialize" => {
                let result = self.handle_initialize(&req);
                self.reply_result(req.id, result).await;
            }
            "ping" => self.reply_result(req.id, json!({})).await,
            "tools/list" => {
                let result = self.handle_tools_list(&req);
                self.reply_result(req.id, result).await;
            }
            "tools/call" => match self.handle_tools_call(&req).await {
                Ok(result) => self.reply_result(req.id, result).await,
                Err(message) => self.reply_error(req.id, message).await,
            },
            _ => {
                tracing::warn!(method = %req.method, "Method not implemented");
                let message = format!("Method not implemented: {}", req.method);
                self.reply_error(req.id, message).await;
            }
        }
    }

    /// Notifications never get a reply.
    fn handle_notification(notif: &JsonRpcNotification) {
        tracing::debug!(method = %notif.method, "Ignoring notification");
    }

    /// Handles the initialize request.
    fn handle_initialize(&self, req: &JsonRpcRequest) -> Value {
        if let Some(raw) = req.param("capabilities") {
            match serde_json::from_value::<ClientCapabilities>(raw.clone()) {
                Ok(caps) => {
                    if let Some(vision) = caps.vision {
                        tracing::info!(url = %vision.url, "Vision service configured");
                        self.capabilities.set_vision(vision);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring unreadable client capabilities");
                }
            }
        }

        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": ServerCapabilities {
                tools: ToolCapabilities::default(),
            },
            "serverInfo": ServerInfo {
                name: self.settings.name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        })
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Value {
        let cursor = req.param_str("cursor").unwrap_or_default();
        let page = self.registry.list(
            cursor,
            self.settings.list_max_bytes,
            self.settings.list_entry_overhead,
        );

        tracing::debug!(
            cursor,
            returned = page.tools.len(),
            next_cursor = ?page.next_cursor,
            "Listed tools"
        );

        serde_json::to_value(page).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialise tool list");
            json!({ "tools": [] })
        })
    }

    /// Handles the tools/call request.
    ///
    /// `Err` carries the error-reply message.
    async fn handle_tools_call(&self, req: &JsonRpcRequest) -> Result<Value, String> {
        let name = req
            .param_str("name")
            .ok_or_else(|| CallError::MissingName.to_string())?;
        let arguments = req.param("arguments").cloned().unwrap_or(Value::Null);

        let result = self
            .registry
            .call(name, &arguments)
            .await
            .map_err(|e| {
                tracing::warn!(tool = %name, error = %e, "Tool call rejected");
                e.to_string()
            })?;

        serde_json::to_value(&result).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise tool call result");
            "Internal error: failed to serialise result".to_string()
        })
    }

    /// Result-reply primitive.
    async fn reply_result(&self, id: RequestId, result: Value) {
        self.send(&JsonRpcResponse::success(id, result)).await;
    }

    /// Error-reply primitive.
    async fn reply_error(&self, id: RequestId, message: impl Into<String>) {
        self.send(&JsonRpcError::new(id, message)).await;
    }

    async fn send<T: Serialize>(&self, message: &T) {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialise reply");
                return;
            }
        };

        match &self.sender {
            Some(send) => send(payload).await,
            None => tracing::warn!(reply = %payload, "No sender configured, dropping reply"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::mcp::registry::Tool;
    use crate::mcp::schema::{Property, PropertyValue};

    fn capture() -> (SendFn, Arc<Mutex<Vec<Value>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        let send: SendFn = Arc::new(move |message: String| {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                sink.lock()
                    .unwrap()
                    .push(serde_json::from_str(&message).unwrap());
            })
        });
        (send, sent)
    }

    fn server() -> (McpServer, Arc<Mutex<Vec<Value>>>) {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(
            Tool::builder("echo")
                .description("Echo")
                .property(Property::string("text"))
                .handler(|args| async move {
                    Ok(PropertyValue::from(args.get_str("text").unwrap_or_default()))
                })
                .build()
                .unwrap(),
        );
        let (send, sent) = capture();
        let server = McpServer::new(registry, ServerSettings::default()).with_sender(send);
        (server, sent)
    }

    fn last(sent: &Arc<Mutex<Vec<Value>>>) -> Value {
        sent.lock().unwrap().last().cloned().unwrap()
    }

    #[tokio::test]
    async fn initialize_reports_identity_and_stores_vision() {
        let (server, sent) = server();
        server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"capabilities":{"vision":{"url":"http://vision.local/explain","token":"t0k"}}}}"#,
            )
            .await;

        let reply = last(&sent);
        assert_eq!(reply["id"], 1);
        assert_eq!(reply["result"]["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(reply["result"]["capabilities"], json!({"tools": {}}));
        assert_eq!(reply["result"]["serverInfo"]["name"], SERVER_NAME);

        let vision = server.capabilities().vision().unwrap();
        assert_eq!(vision.url, "http://vision.local/explain");
        assert_eq!(vision.token.as_deref(), Some("t0k"));
    }

    #[tokio::test]
    async fn notifications_are_silent() {
        let (server, sent) = server();
        server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unparseable_and_idless_messages_are_dropped() {
        let (server, sent) = server();
        server.handle_line("{oops").await;
        server
            .handle_line(r#"{"jsonrpc":"2.0","method":"tools/list"}"#)
            .await;
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bad_version_with_id_gets_error_reply() {
        let (server, sent) = server();
        server
            .handle_line(r#"{"jsonrpc":"1.0","id":3,"method":"tools/list"}"#)
            .await;
        assert_eq!(
            last(&sent),
            json!({
                "jsonrpc": "2.0",
                "id": 3,
                "error": {"message": "Invalid or missing jsonrpc version"}
            })
        );

        server
            .handle_line(r#"{"jsonrpc":"2.0","id":"m"}"#)
            .await;
        assert_eq!(
            last(&sent),
            json!({"jsonrpc": "2.0", "id": "m", "error": {"message": "Missing method"}})
        );
    }

    #[tokio::test]
    async fn unknown_method() {
        let (server, sent) = server();
        server
            .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"resources/list"}"#)
            .await;
        assert_eq!(
            last(&sent),
            json!({
                "jsonrpc": "2.0",
                "id": 2,
                "error": {"message": "Method not implemented: resources/list"}
            })
        );
    }

    #[tokio::test]
    async fn ping_answers_empty_object() {
        let (server, sent) = server();
        server
            .handle_line(r#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#)
            .await;
        assert_eq!(last(&sent), json!({"jsonrpc": "2.0", "id": "p", "result": {}}));
    }

    #[tokio::test]
    async fn tools_call_echo() {
        let (server, sent) = server();
        server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"echo","arguments":{"text":"hi"}}}"#,
            )
            .await;
        assert_eq!(
            last(&sent)["result"],
            json!({"content": [{"type": "text", "text": "hi"}], "isError": false})
        );
    }

    #[tokio::test]
    async fn tools_call_errors() {
        let (server, sent) = server();

        server
            .handle_line(r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{}}"#)
            .await;
        assert_eq!(last(&sent)["error"]["message"], "Missing tool name");

        server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"nope"}}"#,
            )
            .await;
        assert_eq!(last(&sent)["error"]["message"], "Unknown tool: nope");

        server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"name":"echo","arguments":{}}}"#,
            )
            .await;
        let reply = last(&sent);
        assert_eq!(reply["result"]["isError"], true);
        assert_eq!(
            reply["result"]["content"][0]["text"],
            "Missing valid argument: text"
        );
    }

    #[tokio::test]
    async fn tools_list_omits_exhausted_cursor() {
        let (server, sent) = server();
        server
            .handle_line(r#"{"jsonrpc":"2.0","id":9,"method":"tools/list"}"#)
            .await;
        let reply = last(&sent);
        assert_eq!(reply["result"]["tools"][0]["name"], "echo");
        assert!(reply["result"].get("nextCursor").is_none());
    }

    #[tokio::test]
    async fn no_sender_drops_reply() {
        let server = McpServer::new(Arc::new(ToolRegistry::new()), ServerSettings::default());
        server
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
            .await;
    }
}
