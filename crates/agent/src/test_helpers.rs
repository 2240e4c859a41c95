//! Shared test helpers for agent tests.

use async_trait::async_trait;
use clawshell_core::error::{ProviderError, ToolError};
use clawshell_core::names;
use clawshell_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use clawshell_core::tool::{Arguments, Tool, ToolCall, ToolRegistry, ToolResult};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue. With
/// `repeat_last`, the final response is replayed forever; otherwise running
/// out of responses panics.
pub struct SequentialMockProvider {
    responses: Vec<Result<ProviderResponse, ProviderError>>,
    repeat_last: bool,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    /// Script that may include transport failures.
    pub fn scripted(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses,
            repeat_last: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider that answers every request with `response`.
    pub fn always(response: ProviderResponse) -> Self {
        Self {
            repeat_last: true,
            ..Self::new(vec![response])
        }
    }

    /// First requests a single tool call, then answers with `answer`.
    pub fn tool_then_answer(call: ToolCall, answer: &str) -> Self {
        Self::new(vec![
            ProviderResponse::tool_calls(None, vec![call]),
            make_text_response(answer),
        ])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.len();
        requests.push(request);

        let index = if self.repeat_last {
            index.min(self.responses.len() - 1)
        } else {
            index
        };
        match self.responses.get(index) {
            Some(response) => response.clone(),
            None => panic!(
                "SequentialMockProvider: no more responses (call #{index}, have {})",
                self.responses.len()
            ),
        }
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        ..ProviderResponse::text(text)
    }
}

/// Helper to create a tool call from a JSON object literal.
pub fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
    let arguments = match args {
        serde_json::Value::Object(map) => map,
        _ => Arguments::new(),
    };
    ToolCall::new(id, name, arguments)
}

/// A `shell` call with the given command.
pub fn shell_call(id: &str, command: &str) -> ToolCall {
    make_tool_call(id, names::SHELL, json!({ "command": command }))
}

/// A stand-in for a real tool that counts invocations and never touches
/// the machine. The `shell` flavour echoes its command back.
pub struct CountingTool {
    name: &'static str,
    schema: serde_json::Value,
    confirm: bool,
    calls: Arc<AtomicUsize>,
}

impl CountingTool {
    pub fn shell() -> (Self, Arc<AtomicUsize>) {
        Self::build(
            names::SHELL,
            json!({
                "type": "object",
                "properties": { "command": { "type": "string" } },
                "required": ["command"]
            }),
            false,
        )
    }

    pub fn write_file() -> (Self, Arc<AtomicUsize>) {
        Self::build(
            names::WRITE_FILE,
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "content": { "type": "string" }
                },
                "required": ["path", "content"]
            }),
            true,
        )
    }

    fn build(name: &'static str, schema: serde_json::Value, confirm: bool) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                name,
                schema,
                confirm,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl Tool for CountingTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Counts calls"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.schema.clone()
    }

    fn requires_confirmation(&self) -> bool {
        self.confirm
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let output = match arguments.get("command").and_then(|v| v.as_str()) {
            Some(command) => command.strip_prefix("echo ").unwrap_or(command).to_string(),
            None => "ok".to_string(),
        };
        Ok(ToolResult::success(output))
    }
}

/// A registry holding a counting `shell` and a counting `write_file`.
pub fn mock_registry() -> (ToolRegistry, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let mut registry = ToolRegistry::new();
    let (shell, shell_calls) = CountingTool::shell();
    let (write, write_calls) = CountingTool::write_file();
    registry.register(Box::new(shell)).unwrap();
    registry.register(Box::new(write)).unwrap();
    (registry, shell_calls, write_calls)
}
