//! Shared state handed to every built-in tool.
//!
//! Replaces process-wide globals: which files the agent has read this
//! session, and where overwritten content is backed up.

use clawshell_core::error::ToolError;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Default cap on tool output, in characters.
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 30_000;

/// Default shell timeout.
pub const DEFAULT_SHELL_TIMEOUT: Duration = Duration::from_secs(60);

/// Injected context for the built-in tools.
#[derive(Debug)]
pub struct ToolContext {
    pub reads: ReadTracker,
    pub backups: BackupManager,
    working_dir: PathBuf,
    max_output_chars: usize,
    shell_timeout: Duration,
}

impl ToolContext {
    /// Context rooted at the process working directory.
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            reads: ReadTracker::default(),
            backups: BackupManager::new(backup_dir),
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
            shell_timeout: DEFAULT_SHELL_TIMEOUT,
        }
    }

    /// Resolve relative paths and run shell commands from `dir`.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_max_output_chars(mut self, max: usize) -> Self {
        self.max_output_chars = max;
        self
    }

    pub fn with_shell_timeout(mut self, timeout: Duration) -> Self {
        self.shell_timeout = timeout;
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn max_output_chars(&self) -> usize {
        self.max_output_chars
    }

    pub fn shell_timeout(&self) -> Duration {
        self.shell_timeout
    }

    /// Turn a tool-supplied path into an absolute, lexically normalized one.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let raw = Path::new(path);
        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.working_dir.join(raw)
        };
        normalize(&joined)
    }

    /// Cut `text` to the output cap. Returns the kept text and whether
    /// anything was dropped.
    pub fn truncate(&self, text: String) -> (String, bool) {
        truncate_chars(text, self.max_output_chars)
    }
}

pub(crate) fn truncate_chars(text: String, max: usize) -> (String, bool) {
    match text.char_indices().nth(max) {
        Some((cut, _)) => {
            let mut text = text;
            text.truncate(cut);
            (text, true)
        }
        None => (text, false),
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Remembers which files were read this session, so edits can require
/// that the agent looked at the file first.
#[derive(Debug, Default)]
pub struct ReadTracker {
    seen: Mutex<HashSet<PathBuf>>,
}

impl ReadTracker {
    pub fn record(&self, path: &Path) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.insert(path.to_path_buf());
        }
    }

    pub fn has_read(&self, path: &Path) -> bool {
        self.seen
            .lock()
            .map(|seen| seen.contains(path))
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.clear();
        }
    }
}

/// Copies a file aside before it is overwritten.
#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Back up `path` if it exists. Returns the backup location.
    pub async fn backup(&self, path: &Path) -> Result<Option<PathBuf>, ToolError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(None);
        }

        tokio::fs::create_dir_all(&self.dir).await?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".into());
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f");
        let target = self.dir.join(format!("{file_name}.{stamp}.bak"));

        tokio::fs::copy(path, &target).await?;
        debug!(source = %path.display(), backup = %target.display(), "Backed up file");
        Ok(Some(target))
    }
}
