//! Well-known tool names shared by the registry, the safety classifier and
//! the context manager.

/// Generic shell execution.
pub const SHELL: &str = "shell";
/// Read a file's contents.
pub const READ_FILE: &str = "read_file";
/// Create or overwrite a file.
pub const WRITE_FILE: &str = "write_file";
/// Replace a unique span of text in a file.
pub const EDIT_FILE: &str = "edit_file";
/// Regex search across a directory tree.
pub const SEARCH_FILES: &str = "search_files";
/// List a directory.
pub const LIST_DIRECTORY: &str = "list_directory";

/// Tools that change the filesystem without going through the shell.
pub const MUTATING: &[&str] = &[WRITE_FILE, EDIT_FILE];

/// Tools that only observe.
pub const READ_ONLY: &[&str] = &[READ_FILE, SEARCH_FILES, LIST_DIRECTORY];
