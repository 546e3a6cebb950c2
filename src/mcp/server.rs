//! MCP server exposing the guide design tools.
//!
//! This module implements the MCP server lifecycle:
//!
//! 1. **Initialisation**: Capability negotiation and version agreement
//! 2. **Operation**: Handling tool calls and other requests
//! 3. **Shutdown**: EOF on the input stream or a termination signal
//!
//! Tool calls run the external tools on tokio's blocking pool. The server
//! awaits each call before reading the next message, so calls from one
//! client never overlap. Termination signals are watched during those
//! waits too: a signal ends the session without waiting for the tool, and
//! the abandoned call's request is never answered.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::design::{BatchDesignRequest, DesignRequest, DesignTools};
use crate::mcp::protocol::{
    IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RequestId, MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::transport::{StdioTransport, Transport};

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize received, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
}

/// A tool definition for tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }
}

/// The MCP server for guide design tools.
pub struct McpServer<R = tokio::io::BufReader<tokio::io::Stdin>, W = tokio::io::Stdout> {
    /// Current server state.
    state: ServerState,
    /// The transport layer.
    transport: Transport<R, W>,
    /// Negotiated protocol version (set after initialisation).
    protocol_version: Option<String>,
    /// The design tools, shared with blocking tool call tasks.
    tools: Arc<DesignTools>,
}

impl McpServer {
    /// Creates a server speaking over stdin/stdout.
    #[must_use]
    pub fn new(tools: DesignTools) -> Self {
        Self::with_transport(tools, StdioTransport::stdio())
    }
}

impl<R, W> McpServer<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a server over an arbitrary transport.
    #[must_use]
    pub fn with_transport(tools: DesignTools, transport: Transport<R, W>) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            transport,
            protocol_version: None,
            tools: Arc::new(tools),
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Negotiated protocol version, once initialised.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Consumes the server, returning its transport.
    pub fn into_transport(self) -> Transport<R, W> {
        self.transport
    }

    /// Runs the MCP server main loop with graceful shutdown handling.
    ///
    /// SIGINT and SIGTERM (Ctrl+C on Windows) stop the loop even while a
    /// tool call is in flight. The call's blocking task is abandoned and
    /// its request gets no response.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails or signal handlers cannot
    /// be installed.
    pub async fn run(&mut self) -> std::io::Result<()> {
        let shutdown = shutdown_signal()?;
        self.serve_until(shutdown).await
    }

    /// Serves messages until the input stream ends.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve(&mut self) -> std::io::Result<()> {
        self.serve_until(std::future::pending()).await
    }

    /// Serves messages until the input stream ends or `shutdown` completes.
    ///
    /// `shutdown` is polled alongside message handling, including while a
    /// tool call is awaited.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve_until<F>(&mut self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!(state = ?self.state, "Shutdown requested");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                done = self.next_message() => {
                    if done? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Reads and handles one message. Returns `true` at end of input.
    async fn next_message(&mut self) -> std::io::Result<bool> {
        let line_result = self.transport.read_line().await;
        self.handle_transport_result(line_result).await
    }

    /// Handles the result from transport read.
    ///
    /// Returns `true` if the server should shut down.
    async fn handle_transport_result(
        &mut self,
        line_result: std::io::Result<Option<String>>,
    ) -> std::io::Result<bool> {
        let Some(line) = line_result? else {
            self.state = ServerState::ShuttingDown;
            return Ok(true);
        };

        if line.trim().is_empty() {
            return Ok(false);
        }

        self.handle_line(&line).await?;

        Ok(self.state == ServerState::ShuttingDown)
    }

    /// Handles a single line of input.
    async fn handle_line(&mut self, line: &str) -> std::io::Result<()> {
        use crate::mcp::protocol::parse_message;

        match parse_message(line) {
            Ok(IncomingMessage::Request(req)) => self.handle_request(req).await,
            Ok(IncomingMessage::Notification(notif)) => {
                self.handle_notification(&notif);
                Ok(())
            }
            Err(error) => {
                tracing::debug!(code = error.error.code, "Rejected malformed message");
                self.transport.write_message(&error).await
            }
        }
    }

    /// Handles an incoming request.
    async fn handle_request(&mut self, req: JsonRpcRequest) -> std::io::Result<()> {
        tracing::debug!(id = %req.id, method = %req.method, "Handling request");

        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(&req),
            "tools/list" => self.handle_tools_list(&req),
            "tools/call" => self.handle_tools_call(&req).await,
            "ping" => Ok(JsonRpcResponse::success(req.id.clone(), json!({}))),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        };

        match response {
            Ok(resp) => self.transport.write_message(&resp).await,
            Err(error) => self.transport.write_message(&error).await,
        }
    }

    /// Handles an incoming notification.
    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        if notif.method == "notifications/initialized" && self.state == ServerState::Initialising {
            tracing::info!("Client initialised, server running");
            self.state = ServerState::Running;
        }
    }

    /// Handles the initialize request.
    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::invalid_request(
                Some(req.id.clone()),
                "Server already initialised",
            ));
        }

        let params: InitializeParams = parse_params(req, "initialize")?;
        tracing::debug!(client_version = %params.protocol_version, "Initialize requested");

        let negotiated_version = MCP_PROTOCOL_VERSION.to_string();

        self.protocol_version = Some(negotiated_version.clone());
        self.state = ServerState::Initialising;

        let result = json!({
            "protocolVersion": negotiated_version,
            "capabilities": { "tools": {} },
            "serverInfo": ServerInfo::default(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let result = json!({
            "tools": tool_definitions(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/call request.
    async fn handle_tools_call(
        &self,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let params: ToolCallParams = parse_params(req, "tool call")?;
        tracing::info!(tool = %params.name, "Tool call");

        let tools = Arc::clone(&self.tools);
        let result = tokio::task::spawn_blocking(move || {
            call_tool(&tools, &params.name, params.arguments)
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Tool call task failed");
            JsonRpcError::internal_error(req.id.clone(), "Internal error: tool call failed")
        })?;

        let result_value = serde_json::to_value(&result).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::internal_error(
                req.id.clone(),
                "Internal error: failed to serialise result",
            )
        })?;

        Ok(JsonRpcResponse::success(req.id.clone(), result_value))
    }

    /// Ensures the server is in the Running state.
    fn require_running(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state != ServerState::Running {
            return Err(JsonRpcError::invalid_request(
                Some(id.clone()),
                "Server not initialised",
            ));
        }
        Ok(())
    }
}

/// Installs signal handlers and returns a future that completes on the
/// first termination signal.
#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(async move {
        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
        }
    })
}

/// Returns a future that completes on Ctrl+C.
#[cfg(windows)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
            Err(e) => {
                tracing::warn!(error = %e, "Ctrl+C handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    })
}

/// Deserialises required request params.
fn parse_params<T: for<'de> Deserialize<'de>>(
    req: &JsonRpcRequest,
    what: &str,
) -> Result<T, JsonRpcError> {
    let params = req.params.clone().ok_or_else(|| {
        JsonRpcError::invalid_params(req.id.clone(), format!("Missing {what} params"))
    })?;
    serde_json::from_value(params).map_err(|e| {
        JsonRpcError::invalid_params(req.id.clone(), format!("Invalid {what} params: {e}"))
    })
}

// ==================== Tool Handlers ====================

/// Runs a named tool. Blocks until the external process finishes.
fn call_tool(tools: &DesignTools, name: &str, arguments: Value) -> ToolCallResult {
    match name {
        "design_guides" => match serde_json::from_value::<DesignRequest>(arguments) {
            Ok(request) => render(name, tools.design_guides(&request)),
            Err(e) => invalid_arguments(name, &e),
        },
        "design_guides_multiple" => match serde_json::from_value::<BatchDesignRequest>(arguments) {
            Ok(request) => render(name, tools.design_guides_multiple(&request)),
            Err(e) => invalid_arguments(name, &e),
        },
        _ => ToolCallResult::error(format!("Unknown tool: {name}")),
    }
}

fn render<T: Serialize>(tool: &str, outcome: crate::design::DesignResult<T>) -> ToolCallResult {
    match outcome {
        Ok(outcome) => match serde_json::to_string_pretty(&outcome) {
            Ok(text) => ToolCallResult::text(text),
            Err(e) => ToolCallResult::error(format!("Failed to serialise {tool} result: {e}")),
        },
        Err(e) => {
            tracing::warn!(tool, error = %e, "Tool call failed");
            error_result(tool, &e)
        }
    }
}

fn invalid_arguments(tool: &str, error: &serde_json::Error) -> ToolCallResult {
    ToolCallResult::error(format!("Invalid arguments for {tool}: {error}"))
}

/// Formats an error and its source chain as a JSON error payload.
fn error_result(tool: &str, error: &dyn std::error::Error) -> ToolCallResult {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    let result = json!({
        "status": "error",
        "tool": tool,
        "error": message,
    });
    ToolCallResult::error(
        serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string()),
    )
}

/// Returns the list of available tools.
#[must_use]
pub fn tool_definitions() -> Vec<ToolDefinition> {
    let input_properties = json!({
        "input_text": {
            "type": "string",
            "description": "Sequence or FASTA text. Bare sequences are wrapped and given a '>sequence_1' header. Mutually exclusive with input_file."
        },
        "input_file": {
            "type": "string",
            "description": "Existing input file, relative to the working root or absolute. Mutually exclusive with input_text."
        },
        "input_type": {
            "type": "string",
            "description": "Input format passed to the tool (default: fasta)"
        }
    });

    let mut single = input_properties.clone();
    if let Some(props) = single.as_object_mut() {
        props.extend(
            json!({
                "output_name": {
                    "type": "string",
                    "description": "Output name; the tool writes to a directory named <output_name>_<suffix>"
                },
                "variant_file": {
                    "type": "string",
                    "description": "Variant summary file (default: variant_summary.txt)"
                },
                "be_type": {
                    "type": "string",
                    "description": "Named base editor. When set, pam/edit_window/sg_len/edit are ignored."
                },
                "pam": { "type": "string", "description": "PAM pattern (default: NGG)" },
                "edit_window": { "type": "string", "description": "Editing window (default: 4-8)" },
                "sg_len": { "type": "integer", "minimum": 1, "description": "Guide length (default: 20)" },
                "edit": { "type": "string", "description": "Edit mode (default: all)" },
                "intron_buffer": { "type": "integer", "minimum": 0, "description": "Intron buffer in bases (default: 30)" },
                "filter_gc": { "type": "boolean", "description": "Filter guides by GC content (default: false)" }
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
        );
    }

    let mut multi = input_properties;
    if let Some(props) = multi.as_object_mut() {
        props.extend(
            json!({
                "be_file": { "type": "string", "description": "Batch file of base editors or parameter rows" },
                "be_type": { "type": "string", "description": "Base editor type selector" },
                "output_prefix": { "type": "string", "description": "Prefix for every output directory" }
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
        );
    }

    vec![
        ToolDefinition {
            name: "design_guides".to_string(),
            description: "Run base editor guide design for a single set of parameters. \
                          Returns ok, output_folder (null if none could be identified), \
                          new_output_dirs, stdout, stderr and returncode. \
                          A non-zero returncode is reported with ok=false, not as an error."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": single,
                "required": ["output_name"]
            }),
        },
        ToolDefinition {
            name: "design_guides_multiple".to_string(),
            description: "Run base editor guide design for multiple BE types or parameter rows. \
                          Returns ok, every output directory created during the run \
                          (new_output_dirs), stdout, stderr and returncode."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": multi,
                "required": ["be_file", "be_type", "output_prefix"]
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{CommandExecutor, CommandOutput, DesignResult, ToolSettings, Workspace};
    use std::path::Path;
    use std::sync::{mpsc, Mutex};

    struct Exit(i32);

    impl CommandExecutor for Exit {
        fn execute(&self, _argv: &[String], _cwd: &Path) -> DesignResult<CommandOutput> {
            Ok(CommandOutput {
                returncode: self.0,
                stdout: String::new(),
                stderr: "bad input".to_string(),
            })
        }
    }

    /// Announces that it started, then blocks until the release sender is dropped.
    struct Hung {
        started: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl CommandExecutor for Hung {
        fn execute(&self, _argv: &[String], _cwd: &Path) -> DesignResult<CommandOutput> {
            let _ = self.started.lock().unwrap().send(());
            let _ = self.release.lock().unwrap().recv();
            Ok(CommandOutput {
                returncode: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn tools_exiting(root: &Path, code: i32) -> DesignTools {
        DesignTools::with_executor(Workspace::new(root), ToolSettings::default(), Exit(code))
    }

    fn text_of(result: &ToolCallResult) -> &str {
        match &result.content[0] {
            ToolContent::Text { text } => text,
        }
    }

    #[test]
    fn server_initial_state() {
        let root = tempfile::tempdir().unwrap();
        let tools = DesignTools::new(Workspace::new(root.path()), ToolSettings::default());
        let server = McpServer::with_transport(tools, Transport::new(&b""[..], Vec::new()));
        assert_eq!(server.state(), ServerState::AwaitingInit);
        assert!(server.protocol_version().is_none());
    }

    #[test]
    fn tool_definitions_valid() {
        let tools = tool_definitions();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["design_guides", "design_guides_multiple"]);

        for tool in &tools {
            assert!(tool.input_schema.is_object());
            assert!(tool.input_schema["properties"]["input_text"].is_object());
        }
        assert!(tools[0].input_schema["properties"]["filter_gc"].is_object());
        assert!(tools[1].input_schema["properties"]["be_file"].is_object());
    }

    #[test]
    fn tool_call_result_error() {
        let result = ToolCallResult::error("Something went wrong");
        assert!(result.is_error);
        assert_eq!(text_of(&result), "Something went wrong");
    }

    #[test]
    fn unknown_tool_is_error_result() {
        let root = tempfile::tempdir().unwrap();
        let tools = tools_exiting(root.path(), 0);

        let result = call_tool(&tools, "design_primers", json!({}));
        assert!(result.is_error);
        assert!(text_of(&result).contains("Unknown tool"));
    }

    #[test]
    fn missing_required_argument_is_error_result() {
        let root = tempfile::tempdir().unwrap();
        let tools = tools_exiting(root.path(), 0);

        let result = call_tool(&tools, "design_guides", json!({"input_text": "ACGT"}));
        assert!(result.is_error);
        assert!(text_of(&result).contains("output_name"));
    }

    #[test]
    fn empty_input_is_error_result() {
        let root = tempfile::tempdir().unwrap();
        let tools = tools_exiting(root.path(), 0);

        let result = call_tool(
            &tools,
            "design_guides",
            json!({"input_text": "  \n ", "output_name": "run"}),
        );
        assert!(result.is_error);
        assert!(text_of(&result).contains("empty"));
    }

    #[test]
    fn non_zero_exit_is_not_error_result() {
        let root = tempfile::tempdir().unwrap();
        let tools = tools_exiting(root.path(), 2);

        let result = call_tool(
            &tools,
            "design_guides",
            json!({"input_text": "ACGT", "output_name": "run"}),
        );
        assert!(!result.is_error);

        let body: Value = serde_json::from_str(text_of(&result)).unwrap();
        assert_eq!(body["ok"], false);
        assert_eq!(body["returncode"], 2);
        assert_eq!(body["stderr"], "bad input");
        assert!(body["output_folder"].is_null());
    }

    #[tokio::test]
    async fn shutdown_interrupts_running_tool_call() {
        let root = tempfile::tempdir().unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let tools = DesignTools::with_executor(
            Workspace::new(root.path()),
            ToolSettings::default(),
            Hung {
                started: Mutex::new(started_tx),
                release: Mutex::new(release_rx),
            },
        );

        let input = [
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05"}}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"design_guides","arguments":{"input_text":"ACGT","output_name":"run"}}}"#,
            r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#,
        ]
        .join("\n");
        let mut server =
            McpServer::with_transport(tools, Transport::new(input.as_bytes(), Vec::new()));

        let shutdown = async move {
            let _ = tokio::task::spawn_blocking(move || started_rx.recv()).await;
        };
        server.serve_until(shutdown).await.unwrap();
        assert_eq!(server.state(), ServerState::ShuttingDown);
        drop(release_tx);

        let output = String::from_utf8(server.into_transport().into_writer()).unwrap();
        let responses: Vec<Value> = output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 1);
    }
}
