//! Search tool: regex search over a directory tree.

use crate::context::ToolContext;
use async_trait::async_trait;
use clawshell_core::error::ToolError;
use clawshell_core::names;
use clawshell_core::tool::{Arguments, Tool, ToolResult};
use regex_lite::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Stop after this many matching lines.
const MAX_MATCHES: usize = 200;

/// Matched lines longer than this are shortened.
const MAX_LINE_CHARS: usize = 240;

/// Directories that are never descended into.
const SKIP_DIRS: &[&str] = &["target", "node_modules", "__pycache__"];

pub struct SearchFilesTool {
    ctx: Arc<ToolContext>,
}

impl SearchFilesTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        names::SEARCH_FILES
    }

    fn description(&self) -> &str {
        "Search file contents under a directory with a regular expression. Returns path:line: text matches."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression to search for"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search (defaults to the working directory)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let pattern = arguments
            .get("pattern")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'pattern' argument".into()))?;
        let regex = Regex::new(pattern)
            .map_err(|e| ToolError::InvalidArguments(format!("invalid pattern: {e}")))?;

        let root = self
            .ctx
            .resolve(arguments.get("path").and_then(|v| v.as_str()).unwrap_or("."));
        if !root.is_dir() {
            return Err(ToolError::ExecutionFailed {
                tool_name: names::SEARCH_FILES.into(),
                reason: format!("{} is not a directory", root.display()),
            });
        }

        debug!(pattern, root = %root.display(), "Searching files");

        let search_root = root.clone();
        let (matches, capped) = tokio::task::spawn_blocking(move || search(&search_root, &regex))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: names::SEARCH_FILES.into(),
                reason: e.to_string(),
            })?;

        if matches.is_empty() {
            return Ok(ToolResult::success("No matches found."));
        }

        let (output, truncated) = self.ctx.truncate(matches.join("\n"));
        Ok(ToolResult::success(output).with_truncated(truncated || capped))
    }
}

/// Walk `root` depth-first in name order. Returns the matching lines and
/// whether the match cap was hit.
fn search(root: &Path, regex: &Regex) -> (Vec<String>, bool) {
    let mut matches = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries: Vec<PathBuf> = match std::fs::read_dir(&dir) {
            Ok(rd) => rd.filter_map(|e| e.ok().map(|e| e.path())).collect(),
            Err(_) => continue,
        };
        entries.sort();

        let mut subdirs = Vec::new();
        for path in entries {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if name.starts_with('.') {
                continue;
            }
            if path.is_dir() {
                if !SKIP_DIRS.contains(&name.as_str()) {
                    subdirs.push(path);
                }
                continue;
            }

            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            let display = path.strip_prefix(root).unwrap_or(&path).display().to_string();
            for (idx, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    let line: String = line.chars().take(MAX_LINE_CHARS).collect();
                    matches.push(format!("{display}:{}: {}", idx + 1, line.trim_end()));
                    if matches.len() >= MAX_MATCHES {
                        return (matches, true);
                    }
                }
            }
        }
        // Reverse so the stack pops subdirectories in name order.
        stack.extend(subdirs.into_iter().rev());
    }

    (matches, false)
}
