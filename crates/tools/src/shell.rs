//! Shell tool: execute system commands.
//!
//! Runs through `sh -c` in the context's working directory, with a timeout
//! and an output cap. Risk screening happens before dispatch, not here.

use crate::context::ToolContext;
use async_trait::async_trait;
use clawshell_core::error::ToolError;
use clawshell_core::names;
use clawshell_core::tool::{Arguments, Tool, ToolResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Execute shell commands.
pub struct ShellTool {
    ctx: Arc<ToolContext>,
}

impl ShellTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        names::SHELL
    }

    fn description(&self) -> &str {
        "Execute a shell command and return stdout/stderr. Use this for running programs, inspecting the system, git operations, etc."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Seconds to wait before killing the command"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let command = arguments
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        let timeout = arguments
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.ctx.shell_timeout());

        debug!(command = %command, timeout_secs = timeout.as_secs(), "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(self.ctx.working_dir()).kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: names::SHELL.into(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(command = %command, "Command timed out");
                return Err(ToolError::Timeout {
                    tool_name: names::SHELL.into(),
                    timeout_secs: timeout.as_secs(),
                });
            }
        };

        let code = output.status.code().unwrap_or(-1);
        if code != 0 {
            warn!(command = %command, exit_code = code, "Command failed");
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        let (stdout, stdout_truncated) = self.ctx.truncate(stdout);
        let (stderr, stderr_truncated) = self.ctx.truncate(stderr);

        Ok(ToolResult {
            output: stdout,
            error: (!stderr.is_empty()).then_some(stderr),
            exit_code: code,
            truncated: stdout_truncated || stderr_truncated,
        })
    }
}
