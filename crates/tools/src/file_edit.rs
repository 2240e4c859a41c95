//! File edit tool: replace one exact span of text in a file.
//!
//! The file must have been read this session, and `old_text` must occur
//! exactly once, so the model edits what it has actually seen.

use crate::context::ToolContext;
use async_trait::async_trait;
use clawshell_core::error::ToolError;
use clawshell_core::names;
use clawshell_core::tool::{Arguments, Tool, ToolResult};
use std::sync::Arc;
use tracing::info;

pub struct FileEditTool {
    ctx: Arc<ToolContext>,
}

impl FileEditTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

fn str_arg<'a>(arguments: &'a Arguments, key: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

#[async_trait]
impl Tool for FileEditTool {
    fn name(&self) -> &str {
        names::EDIT_FILE
    }

    fn description(&self) -> &str {
        "Replace an exact, unique span of text in a file. Read the file first; old_text must match exactly once."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file to edit"
                },
                "old_text": {
                    "type": "string",
                    "description": "Exact text to replace; must occur once"
                },
                "new_text": {
                    "type": "string",
                    "description": "Replacement text"
                }
            },
            "required": ["path", "old_text", "new_text"]
        })
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let path = str_arg(&arguments, "path")?;
        let old_text = str_arg(&arguments, "old_text")?;
        let new_text = str_arg(&arguments, "new_text")?;

        if old_text.is_empty() {
            return Err(ToolError::InvalidArguments("old_text must not be empty".into()));
        }

        let resolved = self.ctx.resolve(path);
        if !self.ctx.reads.has_read(&resolved) {
            return Err(ToolError::PermissionDenied {
                tool_name: names::EDIT_FILE.into(),
                reason: format!("read {} with read_file before editing it", resolved.display()),
            });
        }

        let content = tokio::fs::read_to_string(&resolved).await?;
        let occurrences = content.matches(old_text).count();
        match occurrences {
            1 => {}
            0 => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: names::EDIT_FILE.into(),
                    reason: "old_text not found in file".into(),
                });
            }
            n => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: names::EDIT_FILE.into(),
                    reason: format!(
                        "old_text occurs {n} times; include more surrounding context"
                    ),
                });
            }
        }

        self.ctx.backups.backup(&resolved).await?;
        let updated = content.replacen(old_text, new_text, 1);
        tokio::fs::write(&resolved, &updated).await?;

        info!(path = %resolved.display(), "Edited file");
        Ok(ToolResult::success(format!("Edited {}", resolved.display())))
    }
}
