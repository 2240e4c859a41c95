//! File read tool: return a file's contents and remember that it was read.

use crate::context::ToolContext;
use async_trait::async_trait;
use clawshell_core::error::ToolError;
use clawshell_core::names;
use clawshell_core::tool::{Arguments, Tool, ToolResult};
use std::sync::Arc;
use tracing::debug;

pub struct FileReadTool {
    ctx: Arc<ToolContext>,
}

impl FileReadTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        names::READ_FILE
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the given path. Read a file before editing it."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let path = arguments
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let resolved = self.ctx.resolve(path);
        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: names::READ_FILE.into(),
                reason: format!("cannot read {}: {e}", resolved.display()),
            })?;

        self.ctx.reads.record(&resolved);
        debug!(path = %resolved.display(), bytes = content.len(), "Read file");

        let (content, truncated) = self.ctx.truncate(content);
        Ok(ToolResult::success(content).with_truncated(truncated))
    }
}
