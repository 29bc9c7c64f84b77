//! MCP dispatch core.
//!
//! One [`McpServer`] owns the configuration, the session table and the tool
//! cache, and routes every parsed JSON-RPC message to its handler. Transports
//! are thin adapters: they hand raw strings to [`McpServer::handle_message`]
//! and write back whatever it returns.
//!
//! # Lifecycle
//!
//! 1. **Initialisation**: `initialize` request creates a session and
//!    negotiates capabilities, `notifications/initialized` completes the
//!    handshake.
//! 2. **Operation**: `tools/list`, `tools/call`, `ping`.
//! 3. **Shutdown**: [`McpServer::stop`] signals every transport and the
//!    cleanup sweep, then joins them with a bounded timeout.
//!
//! # Error policy
//!
//! Tool failures are reported inside a *successful* JSON-RPC response whose
//! payload has `isError: true`; JSON-RPC error responses are reserved for
//! protocol-level failures (malformed JSON, unknown method, bad params).

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{json, Map, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::mcp::protocol::{
    classify, extract_id, parse_value, IncomingMessage, JsonRpcError, JsonRpcErrorData,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, MessageKind,
};
use crate::mcp::result::{to_tool_result, ToolResult};
use crate::mcp::schema::{tool_descriptor, ToolDescriptor};
use crate::skills::{Arguments, SkillError, SkillRegistry};

/// Server-side record of one client handshake.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session identifier (`session_{n}`).
    pub id: String,
    /// Client `clientInfo` from the initialize request.
    pub client_info: Value,
    /// Client capabilities from the initialize request.
    pub client_capabilities: Value,
    /// Protocol version the client requested, if any.
    pub protocol_version: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Expiry timestamp; the cleanup sweep removes the session past this.
    pub expires_at: DateTime<Utc>,
}

/// Mutable state shared between transports, guarded by one mutex.
struct CoreState {
    sessions: HashMap<String, Session>,
    tools_cache: Option<Vec<ToolDescriptor>>,
    /// Monotonic; never reused, so ids stay unique across deletions.
    session_counter: u64,
}

/// The MCP dispatch core.
pub struct McpServer {
    config: ServerConfig,
    registry: Arc<dyn SkillRegistry>,
    state: Mutex<CoreState>,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl McpServer {
    /// Creates a new server over a skill registry.
    #[must_use]
    pub fn new(config: ServerConfig, registry: Arc<dyn SkillRegistry>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            registry,
            state: Mutex::new(CoreState {
                sessions: HashMap::new(),
                tools_cache: None,
                session_counter: 0,
            }),
            running: AtomicBool::new(false),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// The merged server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Whether the server is currently started.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CoreState> {
        // A poisoned lock only means another thread panicked mid-update;
        // the state itself stays structurally valid.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts every enabled transport and the periodic session sweep.
    ///
    /// Idempotent: calling `start` on a running server logs a warning and
    /// does nothing. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if TLS was requested (not served by this binary).
    pub fn start(self: Arc<Self>) -> Result<(), ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("server is already running");
            return Ok(());
        }

        if self.config.http.enabled && self.config.http.use_https {
            self.running.store(false, Ordering::SeqCst);
            return Err(ServerError::TlsUnavailable);
        }

        let mut tasks = Vec::new();

        if self.config.http.enabled {
            tasks.push(crate::mcp::transport::http::spawn(
                Arc::clone(&self),
                self.shutdown.subscribe(),
            ));
        }

        if self.config.stdio.enabled {
            tasks.push(crate::mcp::transport::stdio::spawn(
                Arc::clone(&self),
                self.shutdown.subscribe(),
            ));
        }

        tasks.push(Self::spawn_cleanup_task(Arc::clone(&self)));

        let mut slots = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        slots.extend(tasks);

        info!("MCP server started");
        Ok(())
    }

    /// Stops every transport, cancels the sweep and clears the session table.
    ///
    /// Idempotent: stopping a stopped server logs a warning and returns.
    /// Each task is joined with a bounded timeout and aborted if it does not
    /// finish in time.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("server is not running");
            return;
        }

        let _ = self.shutdown.send(true);

        let handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));

        for handle in handles {
            let abort = handle.abort_handle();
            if tokio::time::timeout(std::time::Duration::from_secs(5), handle)
                .await
                .is_err()
            {
                warn!("task did not stop within timeout, aborting");
                abort.abort();
            }
        }

        self.lock_state().sessions.clear();
        info!("MCP server stopped");
    }

    fn spawn_cleanup_task(server: Arc<Self>) -> JoinHandle<()> {
        let mut shutdown = server.shutdown.subscribe();
        let interval = std::time::Duration::from_secs(server.config.cleanup_interval.max(1));

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    () = tokio::time::sleep(interval) => {
                        let removed = server.sweep_expired_sessions();
                        if removed > 0 {
                            info!(removed, "removed expired sessions");
                        }
                    }
                }
            }
        })
    }

    /// Removes sessions whose expiry lies in the past. Returns the count.
    pub fn sweep_expired_sessions(&self) -> usize {
        let now = Utc::now();
        let mut state = self.lock_state();
        let before = state.sessions.len();
        state.sessions.retain(|_, session| session.expires_at >= now);
        before - state.sessions.len()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.lock_state().sessions.len()
    }

    /// Looks up a session by id.
    #[must_use]
    pub fn session(&self, id: &str) -> Option<Session> {
        self.lock_state().sessions.get(id).cloned()
    }

    /// Removes a session explicitly (`DELETE /mcp`). Returns whether it
    /// existed.
    pub fn close_session(&self, id: &str) -> bool {
        let removed = self.lock_state().sessions.remove(id).is_some();
        if removed {
            info!(session_id = id, "session closed explicitly");
        }
        removed
    }

    // ------------------------------------------------------------------
    // Message dispatch
    // ------------------------------------------------------------------

    /// Processes one raw JSON-RPC message (or batch) and returns the
    /// serialised response, or `None` when nothing must be sent back.
    ///
    /// This is the single entry point used by every transport. No failure
    /// escapes: malformed JSON yields a `-32700` response, an unexpected
    /// panic during routing yields `-32603` with a `null` id (the original
    /// id is not recoverable at that point).
    #[must_use]
    pub fn handle_message(&self, raw: &str) -> Option<String> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(_) => {
                return Some(error_to_string(&JsonRpcError::parse_error()));
            }
        };

        match catch_unwind(AssertUnwindSafe(|| self.dispatch_value(value))) {
            Ok(response) => response.map(|v| v.to_string()),
            Err(panic) => {
                warn!("panic while routing message");
                let mut data = JsonRpcErrorData::with_message(
                    crate::mcp::protocol::ErrorCode::InternalError,
                    "Internal error",
                );
                if self.debug_diagnostics() {
                    data = data.with_data(json!(panic_text(&*panic)));
                }
                Some(error_to_string(&JsonRpcError::new(None, data)))
            }
        }
    }

    /// Diagnostic `data` on internal errors is attached only at debug
    /// verbosity, to avoid leaking internals in production. The binary folds
    /// its `-v`/`-q` flags into `logging.level` before constructing the
    /// server, so this reflects the effective level.
    fn debug_diagnostics(&self) -> bool {
        matches!(self.config.logging.level.as_str(), "debug" | "trace")
    }

    fn dispatch_value(&self, value: Value) -> Option<Value> {
        match classify(&value) {
            MessageKind::Batch => {
                let Value::Array(items) = value else {
                    return None;
                };
                let mut responses = Vec::new();
                for item in items {
                    if let Some(response) = self.dispatch_batch_item(item) {
                        responses.push(response);
                    }
                }
                if responses.is_empty() {
                    None
                } else {
                    Some(Value::Array(responses))
                }
            }
            MessageKind::Request => match parse_value(value) {
                Ok(IncomingMessage::Request(req)) => Some(self.handle_request(&req)),
                Ok(IncomingMessage::Notification(notif)) => {
                    self.handle_notification(&notif);
                    None
                }
                Err(error) => Some(error_to_value(&error)),
            },
            MessageKind::Notification => {
                match parse_value(value) {
                    Ok(IncomingMessage::Notification(notif)) => self.handle_notification(&notif),
                    Ok(IncomingMessage::Request(req)) => return Some(self.handle_request(&req)),
                    Err(_) => debug!("dropping malformed notification"),
                }
                None
            }
            MessageKind::Response => {
                debug!("ignoring inbound response message");
                None
            }
            MessageKind::Invalid => {
                let id = extract_id(&value);
                Some(error_to_value(&JsonRpcError::invalid_request(id)))
            }
        }
    }

    /// One element of a batch: requests yield response entries,
    /// notifications contribute nothing.
    fn dispatch_batch_item(&self, item: Value) -> Option<Value> {
        match classify(&item) {
            MessageKind::Notification => {
                match parse_value(item) {
                    Ok(IncomingMessage::Notification(notif)) => self.handle_notification(&notif),
                    _ => debug!("dropping malformed batch notification"),
                }
                None
            }
            MessageKind::Request => match parse_value(item) {
                Ok(IncomingMessage::Request(req)) => Some(self.handle_request(&req)),
                Ok(IncomingMessage::Notification(_)) => None,
                Err(error) => Some(error_to_value(&error)),
            },
            _ => {
                let id = extract_id(&item);
                Some(error_to_value(&JsonRpcError::invalid_request(id)))
            }
        }
    }

    /// Routes a request by exact method match.
    fn handle_request(&self, req: &JsonRpcRequest) -> Value {
        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(req),
            "ping" => Ok(Self::handle_ping(req)),
            "tools/list" => self.handle_tools_list(req),
            "tools/call" => self.handle_tools_call(req),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        };

        match response {
            Ok(resp) => serde_json::to_value(&resp).unwrap_or_else(|_| {
                error_to_value(&JsonRpcError::internal_error("response serialisation failed"))
            }),
            Err(error) => error_to_value(&error),
        }
    }

    /// Routes a notification. Unknown methods are logged and dropped.
    fn handle_notification(&self, notif: &JsonRpcNotification) {
        match notif.method.as_str() {
            "notifications/initialized" => {
                info!("client completed initialisation handshake");
            }
            "notifications/cancelled" => {
                // Reserved hook: in-flight executions are not interrupted.
                let request_id = notif
                    .params
                    .as_ref()
                    .and_then(|p| p.get("requestId"))
                    .cloned()
                    .unwrap_or(Value::Null);
                info!(request_id = %request_id, "cancellation requested");
            }
            other => {
                warn!(method = other, "unhandled notification");
            }
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle handlers
    // ------------------------------------------------------------------

    fn handle_initialize(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        let params = req.params.clone().unwrap_or_else(|| json!({}));
        let protocol_version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        let client_capabilities = params.get("capabilities").cloned().unwrap_or_else(|| json!({}));
        let client_info = params.get("clientInfo").cloned().unwrap_or_else(|| json!({}));

        let now = Utc::now();
        let expires_at = i64::try_from(self.config.session_timeout)
            .ok()
            .and_then(ChronoDuration::try_seconds)
            .and_then(|timeout| now.checked_add_signed(timeout))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let session_id = {
            let mut state = self.lock_state();
            state.session_counter += 1;
            let id = format!("session_{}", state.session_counter);
            state.sessions.insert(
                id.clone(),
                Session {
                    id: id.clone(),
                    client_info: client_info.clone(),
                    client_capabilities,
                    protocol_version,
                    created_at: now,
                    expires_at,
                },
            );
            id
        };

        let client_name = client_info
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(session_id = %session_id, client = client_name, "client initialised");

        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({
                "serverInfo": {
                    "name": self.config.server_name,
                    "version": self.config.server_version,
                },
                "capabilities": {
                    "tools": true,
                },
            }),
        ))
    }

    fn handle_ping(req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }

    // ------------------------------------------------------------------
    // Tool handlers
    // ------------------------------------------------------------------

    /// Returns the cached tool list, regenerating it when empty or when
    /// `refresh` is set. Skills without metadata are skipped.
    #[must_use]
    pub fn get_tools(&self, refresh: bool) -> Vec<ToolDescriptor> {
        {
            let state = self.lock_state();
            if !refresh {
                if let Some(ref cached) = state.tools_cache {
                    return cached.clone();
                }
            }
        }

        // Regenerate outside the lock; the registry may be arbitrarily slow.
        let mut tools = Vec::new();
        for name in self.registry.skill_names() {
            if let Some(metadata) = self.registry.metadata(&name) {
                tools.push(tool_descriptor(&name, &metadata));
            }
        }

        self.lock_state().tools_cache = Some(tools.clone());
        tools
    }

    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        let tools = self.get_tools(false);
        let page_size = self.config.pagination.page_size;

        // Invalid or unparseable cursors silently reset to offset 0.
        let start = req
            .params
            .as_ref()
            .and_then(|p| p.get("cursor"))
            .map_or(0, |cursor| match cursor {
                Value::String(s) => s.parse::<usize>().unwrap_or(0),
                Value::Number(n) => usize::try_from(n.as_i64().unwrap_or(0).max(0)).unwrap_or(0),
                _ => 0,
            })
            .min(tools.len());

        let end = (start + page_size).min(tools.len());
        let page = &tools[start..end];

        let mut result = json!({ "tools": page });
        if end < tools.len() {
            if let Some(obj) = result.as_object_mut() {
                obj.insert("nextCursor".to_string(), json!(end.to_string()));
            }
        }

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    fn handle_tools_call(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        let params = req.params.clone().unwrap_or_else(|| json!({}));

        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return Err(JsonRpcError::invalid_params(
                req.id.clone(),
                "Missing required parameter 'name'",
            ));
        };

        if !self.registry.skill_names().iter().any(|n| n == name) {
            return Err(JsonRpcError::new(
                Some(req.id.clone()),
                JsonRpcErrorData::with_message(
                    crate::mcp::protocol::ErrorCode::MethodNotFound,
                    format!("Tool not found: {name}"),
                ),
            ));
        }

        let result = match params.get("arguments") {
            None | Some(Value::Null) => self.execute_tool(name, &Map::new()),
            Some(Value::Object(args)) => self.execute_tool(name, args),
            Some(_) => ToolResult::error(format!(
                "Error executing tool: arguments for '{name}' must be an object"
            )),
        };

        // Tool failures surface as a successful response with isError=true.
        Ok(JsonRpcResponse::success(
            req.id.clone(),
            serde_json::to_value(&result).unwrap_or_else(|_| json!({})),
        ))
    }

    /// Invokes a skill by name, always returning a result envelope.
    ///
    /// Unknown names, skill errors and even panics inside the callable are
    /// all converted into error envelopes; nothing propagates.
    #[must_use]
    pub fn execute_tool(&self, name: &str, arguments: &Arguments) -> ToolResult {
        let callable = match self.registry.entry(name).as_ref().and_then(|e| e.resolve()) {
            Some(callable) => Arc::clone(callable),
            None => return ToolResult::error(format!("Error: Tool '{name}' not found")),
        };

        match catch_unwind(AssertUnwindSafe(|| callable(arguments))) {
            Ok(outcome) => {
                if let Err(ref error) = outcome {
                    warn!(tool = name, error = %error, "tool execution failed");
                }
                to_tool_result(
                    outcome.map_err(|e| SkillError::Failed(format!("Error executing tool: {e}"))),
                )
            }
            Err(panic) => {
                warn!(tool = name, "tool execution panicked");
                ToolResult::error(format!("Error executing tool: {}", panic_text(&*panic)))
            }
        }
    }
}

fn error_to_value(error: &JsonRpcError) -> Value {
    serde_json::to_value(error).unwrap_or_else(|_| {
        json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": {"code": -32603, "message": "Internal error"},
        })
    })
}

fn error_to_string(error: &JsonRpcError) -> String {
    error_to_value(error).to_string()
}

fn panic_text(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_string())
}
