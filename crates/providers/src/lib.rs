//! Completion backend implementations for clawshell.
//!
//! All providers implement the `clawshell_core::Provider` trait. The CLI
//! builds one from `[provider]` configuration.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
