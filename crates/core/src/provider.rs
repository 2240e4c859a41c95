//! Provider trait: the abstraction over LLM completion backends.
//!
//! A Provider takes the current transcript plus the tool schemas and returns
//! optional text, zero or more structured tool calls, and a finish reason.
//! Backend choice, retry and fallback are the provider's concern; the agent
//! loop never retries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::{ToolCall, ToolDefinition};

/// A single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o-mini", "qwen2.5-coder")
    pub model: String,

    /// The (already trimmed) transcript
    pub messages: Vec<Message>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.2
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of the answer
    #[default]
    Stop,
    /// The model stopped to call tools
    ToolCalls,
    /// Cut off by the max-token limit
    Length,
    /// Anything else the backend reported (content filter, etc.)
    Other,
}

impl FinishReason {
    /// Map a backend's raw finish reason string.
    pub fn from_api(reason: Option<&str>) -> Self {
        match reason {
            None | Some("stop") | Some("end_turn") => Self::Stop,
            Some("tool_calls") | Some("function_call") | Some("tool_use") => Self::ToolCalls,
            Some("length") | Some("max_tokens") => Self::Length,
            Some(_) => Self::Other,
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete response from a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Final or planning text, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Structured tool calls, in emission order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: FinishReason,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model actually responded
    #[serde(default)]
    pub model: String,
}

impl ProviderResponse {
    /// A plain text answer.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// A response that requests tool calls.
    pub fn tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content,
            tool_calls,
            finish_reason: FinishReason::ToolCalls,
            ..Self::default()
        }
    }
}

/// The core Provider trait.
///
/// Every completion backend implements this trait. The agent loop calls
/// `complete()` without knowing which backend is in use.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Health check: can we reach the backend?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}
