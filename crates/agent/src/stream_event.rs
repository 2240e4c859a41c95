//! Agent-level events.
//!
//! `AgentEvent` is everything a renderer needs to reconstruct a turn. The
//! loop sends them in order over a bounded channel.

use clawshell_core::tool::Arguments;
use serde::{Deserialize, Serialize};

/// Events emitted by the agent during a turn.
///
/// - `thinking`       : an inference call is about to start
/// - `planning_text`  : text the model sent alongside tool calls
/// - `executing`      : a tool call is being dispatched
/// - `tool_result`    : the dispatched call finished
/// - `confirm_needed` : the loop is waiting for the operator's decision
/// - `blocked`        : a call was vetoed and will not run
/// - `response`       : the final answer (or the step-limit notice)
/// - `error`          : the turn ended abnormally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// About to request inference step `step` (1-based).
    Thinking { step: u32 },

    /// Text the model produced before its tool calls.
    PlanningText { text: String },

    /// A tool call is about to run.
    Executing {
        call_id: String,
        name: String,
        arguments: Arguments,
    },

    /// Tool execution completed.
    ToolResult {
        call_id: String,
        name: String,
        output: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        exit_code: i32,
        truncated: bool,
    },

    /// The call needs approval before it runs.
    ConfirmNeeded {
        call_id: String,
        name: String,
        arguments: Arguments,
    },

    /// The call was refused by the safety policy.
    Blocked {
        call_id: String,
        name: String,
        reason: String,
    },

    /// Final text for the operator.
    Response { text: String },

    /// The turn failed.
    Error { message: String },
}

impl AgentEvent {
    /// Stable name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Thinking { .. } => "thinking",
            Self::PlanningText { .. } => "planning_text",
            Self::Executing { .. } => "executing",
            Self::ToolResult { .. } => "tool_result",
            Self::ConfirmNeeded { .. } => "confirm_needed",
            Self::Blocked { .. } => "blocked",
            Self::Response { .. } => "response",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event ends the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Response { .. } | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_thinking() {
        let json = serde_json::to_string(&AgentEvent::Thinking { step: 2 }).unwrap();
        assert_eq!(json, r#"{"type":"thinking","step":2}"#);
    }

    #[test]
    fn event_serialization_executing_keeps_argument_order() {
        let mut arguments = Arguments::new();
        arguments.insert("path".into(), "a.txt".into());
        arguments.insert("content".into(), "hi".into());
        let event = AgentEvent::Executing {
            call_id: "call_1".into(),
            name: "write_file".into(),
            arguments,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"executing""#));
        assert!(json.contains(r#""arguments":{"path":"a.txt","content":"hi"}"#));
    }

    #[test]
    fn event_serialization_tool_result() {
        let event = AgentEvent::ToolResult {
            call_id: "call_1".into(),
            name: "shell".into(),
            output: "hi".into(),
            error: None,
            exit_code: 0,
            truncated: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_result""#));
        assert!(json.contains(r#""exit_code":0"#));
        assert!(!json.contains("error"));
    }

    #[test]
    fn event_serialization_tool_result_with_error() {
        let event = AgentEvent::ToolResult {
            call_id: "call_1".into(),
            name: "teleport".into(),
            output: String::new(),
            error: Some("Unknown tool 'teleport'".into()),
            exit_code: 127,
            truncated: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["error"], "Unknown tool 'teleport'");
        let back: AgentEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"blocked","call_id":"c","name":"shell","reason":"rm -rf /"}"#;
        let event: AgentEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            AgentEvent::Blocked {
                call_id: "c".into(),
                name: "shell".into(),
                reason: "rm -rf /".into(),
            }
        );
    }

    #[test]
    fn event_type_names() {
        let cases = [
            (AgentEvent::Thinking { step: 1 }, "thinking"),
            (AgentEvent::PlanningText { text: "x".into() }, "planning_text"),
            (AgentEvent::Response { text: "x".into() }, "response"),
            (AgentEvent::Error { message: "x".into() }, "error"),
            (
                AgentEvent::ConfirmNeeded {
                    call_id: "a".into(),
                    name: "b".into(),
                    arguments: Arguments::new(),
                },
                "confirm_needed",
            ),
        ];
        for (event, name) in cases {
            assert_eq!(event.event_type(), name);
            // The serde tag and event_type agree
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], name);
        }
    }

    #[test]
    fn terminal_events() {
        assert!(AgentEvent::Response { text: "x".into() }.is_terminal());
        assert!(AgentEvent::Error { message: "x".into() }.is_terminal());
        assert!(!AgentEvent::Thinking { step: 1 }.is_terminal());
    }
}
