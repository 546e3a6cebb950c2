//! Termination signals end a session while a tool call is still running.
//!
//! Kept in its own test binary because the signal goes to the whole process.

#![cfg(unix)]

use std::path::Path;
use std::process::Command;
use std::sync::{mpsc, Mutex};

use base_editor_design_mcp::design::{
    CommandExecutor, CommandOutput, DesignResult, DesignTools, ToolSettings, Workspace,
};
use base_editor_design_mcp::mcp::server::{McpServer, ServerState};
use base_editor_design_mcp::mcp::Transport;

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

#[tokio::test]
async fn sigterm_during_tool_call_stops_server() {
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
    ]
    .join("\n");
    let mut server = McpServer::with_transport(tools, Transport::new(input.as_bytes(), Vec::new()));

    // Signal handlers are installed when run() starts, before the call reaches the tool.
    let killer = std::thread::spawn(move || {
        if started_rx.recv().is_ok() {
            Command::new("kill")
                .arg("-TERM")
                .arg(std::process::id().to_string())
                .status()
                .unwrap();
        }
    });

    server.run().await.unwrap();
    assert_eq!(server.state(), ServerState::ShuttingDown);
    drop(release_tx);
    killer.join().unwrap();

    let output = String::from_utf8(server.into_transport().into_writer()).unwrap();
    assert_eq!(output.lines().count(), 1, "only initialize is answered: {output}");
}
