//! Built-in tool implementations for clawshell.
//!
//! Tools give the agent hands on the local machine: run shell commands,
//! read, write and edit files, search a tree, and list directories. All of
//! them share one injected [`ToolContext`].

pub mod context;
pub mod file_edit;
pub mod file_read;
pub mod file_write;
pub mod list_dir;
pub mod search;
pub mod shell;

use clawshell_core::error::ToolError;
use clawshell_core::tool::ToolRegistry;
use std::sync::Arc;

pub use context::{BackupManager, ReadTracker, ToolContext};

/// Create a tool registry with all built-in tools sharing `ctx`.
pub fn default_registry(ctx: Arc<ToolContext>) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(shell::ShellTool::new(ctx.clone())))?;
    registry.register(Box::new(file_read::FileReadTool::new(ctx.clone())))?;
    registry.register(Box::new(file_write::FileWriteTool::new(ctx.clone())))?;
    registry.register(Box::new(file_edit::FileEditTool::new(ctx.clone())))?;
    registry.register(Box::new(search::SearchFilesTool::new(ctx.clone())))?;
    registry.register(Box::new(list_dir::ListDirectoryTool::new(ctx)))?;
    Ok(registry)
}
