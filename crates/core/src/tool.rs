//! Tool trait and registry: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act on the machine:
//! execute shell commands, read/write/edit files, search, etc.
//!
//! The registry is the only place tools are invoked. It never returns an
//! error and never lets a handler panic escape: every outcome, including an
//! unknown tool name or mismatched arguments, becomes a [`ToolResult`] the
//! model can read and adapt to.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::ToolError;

/// Tool arguments: a JSON object that keeps the order the model emitted.
pub type Arguments = serde_json::Map<String, serde_json::Value>;

/// Exit code for a generic handler failure.
pub const EXIT_TOOL_ERROR: i32 = 1;
/// Exit code for arguments that do not fit the declared schema.
pub const EXIT_INVALID_ARGUMENTS: i32 = 2;
/// Exit code recorded for a call that was vetoed or declined and never ran.
pub const EXIT_REFUSED: i32 = 126;
/// Exit code for a tool name nobody registered.
pub const EXIT_UNKNOWN_TOOL: i32 = 127;

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON object
    #[serde(default)]
    pub arguments: Arguments,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// The arguments serialized back to JSON text.
    pub fn arguments_text(&self) -> String {
        serde_json::to_string(&self.arguments).unwrap_or_default()
    }

    /// A string argument, if present.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Standard output / primary content
    pub output: String,

    /// Error text, if the tool failed or wrote to stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// 0 = success
    pub exit_code: i32,

    /// Whether `output` was cut to fit a size cap
    #[serde(default)]
    pub truncated: bool,
}

impl ToolResult {
    /// A successful result.
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: None,
            exit_code: 0,
            truncated: false,
        }
    }

    /// A failed result with no output.
    pub fn failure(error: impl Into<String>, exit_code: i32) -> Self {
        Self {
            output: String::new(),
            error: Some(error.into()),
            exit_code,
            truncated: false,
        }
    }

    /// Mark the output as truncated.
    pub fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Render as the content of a tool-role message.
    ///
    /// The first line is always `Exit code: N`; the context manager relies
    /// on that when summarizing trimmed results.
    pub fn to_message_content(&self) -> String {
        let mut out = format!("Exit code: {}", self.exit_code);
        if !self.output.is_empty() {
            out.push('\n');
            out.push_str(&self.output);
        }
        if let Some(error) = self.error.as_deref().filter(|e| !e.is_empty()) {
            out.push_str("\nError: ");
            out.push_str(error);
        }
        if self.truncated {
            out.push_str("\n[output truncated]");
        }
        out
    }
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,

    /// Whether the tool always needs operator confirmation
    #[serde(default)]
    pub requires_confirmation: bool,
}

impl ToolDefinition {
    /// Declared parameter names, in schema order.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters["properties"]
            .as_object()
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Parameters listed under `required`.
    pub fn required_parameters(&self) -> Vec<&str> {
        self.parameters["required"]
            .as_array()
            .map(|req| req.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }

    /// The definition in OpenAI-style function-calling shape.
    pub fn to_function_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// The core Tool trait.
///
/// Each tool (shell, read_file, write_file, ...) implements this trait and
/// is registered once at startup.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "shell", "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Whether every call needs operator confirmation regardless of
    /// classification.
    fn requires_confirmation(&self) -> bool {
        false
    }

    /// Execute the tool with arguments already validated against the schema.
    ///
    /// Expected failures (missing file, non-zero exit) should come back as a
    /// failed `ToolResult`; `Err` is for exceptional conditions.
    async fn execute(&self, arguments: Arguments) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
            requires_confirmation: self.requires_confirmation(),
        }
    }
}

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Box<dyn Tool>,
}

/// A registry of available tools.
///
/// The agent loop uses this to:
/// 1. Get tool definitions to send to the LLM (in registration order)
/// 2. Dispatch tool calls the LLM requests
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool. A second registration under the same name is
    /// rejected.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> std::result::Result<(), ToolError> {
        let definition = tool.to_definition();
        if self.index.contains_key(&definition.name) {
            return Err(ToolError::DuplicateTool(definition.name));
        }
        debug!(tool = %definition.name, "Registered tool");
        self.index.insert(definition.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            definition,
            handler: tool,
        });
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.entry(name).map(|t| t.handler.as_ref())
    }

    /// Get a tool's definition by name.
    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.entry(name).map(|t| &t.definition)
    }

    /// Get all tool definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    /// All schemas in function-calling shape, in registration order.
    pub fn get_tool_schemas(&self) -> Vec<serde_json::Value> {
        self.tools
            .iter()
            .map(|t| t.definition.to_function_schema())
            .collect()
    }

    /// Whether the named tool is flagged as always needing confirmation.
    pub fn requires_confirmation(&self, name: &str) -> bool {
        self.definition(name)
            .is_some_and(|d| d.requires_confirmation)
    }

    /// List all registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.definition.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn entry(&self, name: &str) -> Option<&RegisteredTool> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Execute a parsed tool call.
    pub async fn execute_call(&self, call: &ToolCall) -> ToolResult {
        self.execute(&call.name, call.arguments.clone()).await
    }

    /// Execute a tool by name.
    ///
    /// Never fails: unknown names, argument mismatches, handler errors and
    /// handler panics are all converted to a failed `ToolResult`.
    pub async fn execute(&self, name: &str, arguments: Arguments) -> ToolResult {
        let Some(entry) = self.entry(name) else {
            warn!(tool = %name, "Model requested an unknown tool");
            return ToolResult::failure(
                format!(
                    "Unknown tool '{name}'. Available tools: {}",
                    self.names().join(", ")
                ),
                EXIT_UNKNOWN_TOOL,
            );
        };

        let arguments = match prepare_arguments(&entry.definition, arguments) {
            Ok(args) => args,
            Err(reason) => {
                warn!(tool = %name, %reason, "Rejected tool arguments");
                return ToolResult::failure(
                    format!("Invalid arguments for '{name}': {reason}"),
                    EXIT_INVALID_ARGUMENTS,
                );
            }
        };

        let outcome = std::panic::AssertUnwindSafe(entry.handler.execute(arguments))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "Tool handler failed");
                ToolResult::failure(format!("{}: {e}", e.kind()), EXIT_TOOL_ERROR)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(tool = %name, %message, "Tool handler panicked");
                ToolResult::failure(format!("panic: {message}"), EXIT_TOOL_ERROR)
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate `arguments` against the declared schema, remapping mis-named
/// arguments positionally when the count matches.
///
/// Phase one accepts arguments whose names are all declared. Phase two runs
/// only when some names are undeclared and the supplied count equals the
/// declared count: correctly named arguments stay put and the mis-named
/// values fill the remaining declared slots in schema order. Any other
/// mismatch is rejected before the handler runs.
fn prepare_arguments(
    definition: &ToolDefinition,
    arguments: Arguments,
) -> std::result::Result<Arguments, String> {
    let declared = definition.parameter_names();
    let required = definition.required_parameters();

    // Optional parameters sent as null are treated as absent.
    let arguments: Arguments = arguments
        .into_iter()
        .filter(|(k, v)| !(v.is_null() && !required.contains(&k.as_str())))
        .collect();

    let unknown: Vec<&str> = arguments
        .keys()
        .map(String::as_str)
        .filter(|k| !declared.contains(k))
        .collect();

    let arguments = if unknown.is_empty() {
        arguments
    } else if arguments.len() == declared.len() {
        warn!(
            tool = %definition.name,
            supplied = ?unknown,
            expected = ?declared,
            "Remapping mis-named tool arguments positionally"
        );
        remap_positionally(&declared, arguments)
    } else {
        return Err(format!(
            "unexpected argument(s) {}; expected parameters: {}",
            unknown.join(", "),
            declared.join(", ")
        ));
    };

    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|r| !arguments.contains_key(*r))
        .collect();
    if !missing.is_empty() {
        return Err(format!(
            "missing required argument(s): {}",
            missing.join(", ")
        ));
    }

    for (name, value) in &arguments {
        let expected = definition.parameters["properties"][name.as_str()]["type"].as_str();
        if let Some(expected) = expected
            && !json_type_matches(expected, value)
        {
            return Err(format!(
                "argument '{name}' should be of type {expected}, got {}",
                json_type_name(value)
            ));
        }
    }

    Ok(arguments)
}

fn remap_positionally(declared: &[&str], arguments: Arguments) -> Arguments {
    let free_slots: Vec<&str> = declared
        .iter()
        .copied()
        .filter(|d| !arguments.contains_key(*d))
        .collect();
    let mut free_slots = free_slots.into_iter();

    let mut remapped = Arguments::new();
    for (key, value) in arguments {
        if declared.contains(&key.as_str()) {
            remapped.insert(key, value);
        } else if let Some(slot) = free_slots.next() {
            remapped.insert(slot.to_string(), value);
        }
    }

    // Restore schema order so handlers see a predictable layout.
    let mut ordered = Arguments::new();
    for name in declared {
        if let Some(value) = remapped.remove(*name) {
            ordered.insert((*name).to_string(), value);
        }
    }
    ordered
}

fn json_type_matches(expected: &str, value: &serde_json::Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(n) if n.is_f64() => "number",
        serde_json::Value::Number(_) => "integer",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
