//! # clawshell Core
//!
//! Domain types, traits, and error definitions for the clawshell agent.
//! This crate has **no runtime dependencies** beyond serde and futures;
//! it defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the agent loop is a trait here (`Provider`,
//! `Tool`). Implementations live in their respective crates. This enables:
//! - Swapping backends via configuration
//! - Easy testing with scripted mock implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod message;
pub mod names;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{Message, Role};
pub use provider::{FinishReason, Provider, ProviderRequest, ProviderResponse, Usage};
pub use tool::{Arguments, Tool, ToolCall, ToolDefinition, ToolRegistry, ToolResult};
