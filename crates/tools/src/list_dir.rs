//! Directory listing tool.

use crate::context::ToolContext;
use async_trait::async_trait;
use clawshell_core::error::ToolError;
use clawshell_core::names;
use clawshell_core::tool::{Arguments, Tool, ToolResult};
use std::sync::Arc;

pub struct ListDirectoryTool {
    ctx: Arc<ToolContext>,
}

impl ListDirectoryTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        names::LIST_DIRECTORY
    }

    fn description(&self) -> &str {
        "List the entries of a directory. Subdirectories end with '/'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (defaults to the working directory)"
                }
            }
        })
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let path = arguments.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let resolved = self.ctx.resolve(path);

        let mut reader = tokio::fs::read_dir(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: names::LIST_DIRECTORY.into(),
                reason: format!("cannot list {}: {e}", resolved.display()),
            })?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                name.push('/');
            }
            entries.push(name);
        }
        entries.sort();

        if entries.is_empty() {
            return Ok(ToolResult::success("(empty directory)"));
        }
        let (output, truncated) = self.ctx.truncate(entries.join("\n"));
        Ok(ToolResult::success(output).with_truncated(truncated))
    }
}
