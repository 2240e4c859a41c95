//! File write tool: create or overwrite files, backing up what was there.

use crate::context::ToolContext;
use async_trait::async_trait;
use clawshell_core::error::ToolError;
use clawshell_core::names;
use clawshell_core::tool::{Arguments, Tool, ToolResult};
use std::sync::Arc;
use tracing::info;

pub struct FileWriteTool {
    ctx: Arc<ToolContext>,
}

impl FileWriteTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        names::WRITE_FILE
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file if it doesn't exist, overwrites if it does."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write to"
                },
                "content": {
                    "type": "string",
                    "description": "The full content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let path = arguments
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let content = arguments
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;

        let resolved = self.ctx.resolve(path);

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let backup = self.ctx.backups.backup(&resolved).await?;
        tokio::fs::write(&resolved, content).await?;
        self.ctx.reads.record(&resolved);

        info!(path = %resolved.display(), bytes = content.len(), "Wrote file");

        let mut output = format!("Wrote {} bytes to {}", content.len(), resolved.display());
        if let Some(backup) = backup {
            output.push_str(&format!(" (previous version saved to {})", backup.display()));
        }
        Ok(ToolResult::success(output))
    }
}
