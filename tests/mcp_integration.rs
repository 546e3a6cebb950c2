//! Integration tests for MCP protocol handling.
//!
//! These tests verify the MCP server's JSON-RPC 2.0 protocol implementation,
//! including request/response handling, error responses, and lifecycle management.
//! Sessions run against in-memory buffers with a fake design tool.

use std::io::Cursor;
use std::path::Path;

use base_editor_design_mcp::design::{
    CommandExecutor, CommandOutput, DesignResult, DesignTools, ToolSettings, Workspace,
};
use base_editor_design_mcp::mcp::protocol::{parse_message, IncomingMessage, RequestId};
use base_editor_design_mcp::mcp::server::{McpServer, ServerState};
use base_editor_design_mcp::mcp::Transport;
use serde_json::{json, Value};

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Request(req) = result.unwrap() {
        assert_eq!(req.method, "initialize");
        assert_eq!(req.id, RequestId::Number(1));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_tools_call_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": "call-7",
        "method": "tools/call",
        "params": {"name": "design_guides", "arguments": {"output_name": "x"}}
    }"#;

    let IncomingMessage::Request(req) = parse_message(json).unwrap() else {
        panic!("Expected Request");
    };
    assert_eq!(req.id, RequestId::String("call-7".to_string()));
    assert_eq!(req.params.unwrap()["name"], "design_guides");
}

#[test]
fn test_parse_missing_jsonrpc_version() {
    let json = r#"{
        "id": 1,
        "method": "test"
    }"#;

    assert!(parse_message(json).is_err());
}

// =============================================================================
// Session Tests
// =============================================================================

/// Creates `<output_name>_result` like the real single-design tool.
struct FakeTool;

impl CommandExecutor for FakeTool {
    fn execute(&self, argv: &[String], cwd: &Path) -> DesignResult<CommandOutput> {
        let name = argv
            .iter()
            .position(|a| a == "--output-name" || a == "--output-prefix")
            .and_then(|i| argv.get(i + 1))
            .cloned()
            .unwrap_or_default();

        if name == "fails" {
            return Ok(CommandOutput {
                returncode: 2,
                stdout: String::new(),
                stderr: "design failed\n".to_string(),
            });
        }

        std::fs::create_dir_all(cwd.join(format!("{name}_result"))).unwrap();
        Ok(CommandOutput {
            returncode: 0,
            stdout: "done\n".to_string(),
            stderr: String::new(),
        })
    }
}

const INITIALIZE: &str = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{}}}"#;
const INITIALIZED: &str = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;

/// Runs a session over the given input lines and returns every response.
async fn session(root: &Path, lines: &[&str]) -> (ServerState, Vec<Value>) {
    let input = lines.iter().map(|l| format!("{l}\n")).collect::<String>();
    let transport = Transport::new(Cursor::new(input.into_bytes()), Vec::new());
    let tools = DesignTools::with_executor(Workspace::new(root), ToolSettings::default(), FakeTool);

    let mut server = McpServer::with_transport(tools, transport);
    server.serve().await.unwrap();
    let state = server.state();

    let output = String::from_utf8(server.into_transport().into_writer()).unwrap();
    let responses = output
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    (state, responses)
}

fn tool_payload(response: &Value) -> Value {
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

#[tokio::test]
async fn full_session_lifecycle() {
    let root = tempfile::tempdir().unwrap();
    let call = json!({
        "jsonrpc": "2.0",
        "id": 3,
        "method": "tools/call",
        "params": {
            "name": "design_guides",
            "arguments": {"input_text": "ACGTACGT", "output_name": "exon1"}
        }
    })
    .to_string();

    let (state, responses) = session(
        root.path(),
        &[
            INITIALIZE,
            INITIALIZED,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            call.as_str(),
            r#"{"jsonrpc":"2.0","id":4,"method":"ping"}"#,
        ],
    )
    .await;

    assert_eq!(state, ServerState::ShuttingDown);
    assert_eq!(responses.len(), 4);

    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[0]["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(
        responses[0]["result"]["serverInfo"]["name"],
        "base-editor-design-mcp"
    );

    let tools = responses[1]["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 2);

    assert_eq!(responses[2]["id"], 3);
    assert!(responses[2]["result"].get("isError").is_none());
    let payload = tool_payload(&responses[2]);
    assert_eq!(payload["ok"], true);
    assert_eq!(payload["returncode"], 0);
    assert_eq!(payload["new_output_dirs"], json!(["exon1_result"]));
    assert!(payload["output_folder"]
        .as_str()
        .unwrap()
        .ends_with("exon1_result"));

    assert_eq!(responses[3]["id"], 4);
    assert_eq!(responses[3]["result"], json!({}));
}

#[tokio::test]
async fn batch_tool_call_omits_output_folder() {
    let root = tempfile::tempdir().unwrap();
    let call = json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/call",
        "params": {
            "name": "design_guides_multiple",
            "arguments": {
                "input_text": "ACGT",
                "be_file": "be.txt",
                "be_type": "ABE",
                "output_prefix": "set"
            }
        }
    })
    .to_string();

    let (_, responses) = session(root.path(), &[INITIALIZE, INITIALIZED, call.as_str()]).await;

    let payload = tool_payload(&responses[1]);
    assert_eq!(payload["ok"], true);
    assert_eq!(payload["new_output_dirs"], json!(["set_result"]));
    assert!(payload.get("output_folder").is_none());
}

#[tokio::test]
async fn failed_design_reported_in_payload() {
    let root = tempfile::tempdir().unwrap();
    let call = json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/call",
        "params": {
            "name": "design_guides",
            "arguments": {"input_text": "ACGT", "output_name": "fails"}
        }
    })
    .to_string();

    let (_, responses) = session(root.path(), &[INITIALIZE, INITIALIZED, call.as_str()]).await;

    let payload = tool_payload(&responses[1]);
    assert_eq!(payload["ok"], false);
    assert_eq!(payload["returncode"], 2);
    assert_eq!(payload["stderr"], "design failed\n");
    assert!(payload["output_folder"].is_null());
}

#[tokio::test]
async fn empty_input_is_tool_error() {
    let root = tempfile::tempdir().unwrap();
    let call = json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/call",
        "params": {
            "name": "design_guides",
            "arguments": {"input_text": "   ", "output_name": "x"}
        }
    })
    .to_string();

    let (_, responses) = session(root.path(), &[INITIALIZE, INITIALIZED, call.as_str()]).await;

    assert_eq!(responses[1]["result"]["isError"], true);
    let payload = tool_payload(&responses[1]);
    assert_eq!(payload["status"], "error");
    assert_eq!(payload["tool"], "design_guides");
}

#[tokio::test]
async fn tools_rejected_before_initialisation() {
    let root = tempfile::tempdir().unwrap();
    let (state, responses) = session(
        root.path(),
        &[r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#],
    )
    .await;

    assert_eq!(state, ServerState::ShuttingDown);
    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[0]["error"]["code"], -32600);
}

#[tokio::test]
async fn protocol_errors_do_not_end_session() {
    let root = tempfile::tempdir().unwrap();
    let (_, responses) = session(
        root.path(),
        &[
            "{ broken json",
            "",
            INITIALIZE,
            INITIALIZE.replace(r#""id":1"#, r#""id":9"#).as_str(),
            INITIALIZED,
            r#"{"jsonrpc":"2.0","id":5,"method":"resources/list"}"#,
            r#"{"jsonrpc":"2.0","id":6,"method":"tools/call"}"#,
        ],
    )
    .await;

    assert_eq!(responses.len(), 5);
    assert_eq!(responses[0]["error"]["code"], -32700);
    assert_eq!(responses[1]["id"], 1);
    assert!(responses[1].get("result").is_some());
    assert_eq!(responses[2]["id"], 9);
    assert_eq!(responses[2]["error"]["code"], -32600);
    assert_eq!(responses[3]["error"]["code"], -32601);
    assert_eq!(responses[4]["id"], 6);
    assert_eq!(responses[4]["error"]["code"], -32602);
}
