//! The agent reasoning loop implementation.

use std::sync::Arc;

use clawshell_config::AppConfig;
use clawshell_core::message::Message;
use clawshell_core::provider::{FinishReason, Provider, ProviderRequest};
use clawshell_core::tool::{EXIT_REFUSED, ToolCall, ToolDefinition, ToolRegistry, ToolResult};
use clawshell_security::{Assessment, Risk, SafetyClassifier};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::confirm::ConfirmationHandler;
use crate::context::ContextManager;
use crate::stream_event::AgentEvent;

/// System prompt used when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are clawshell, an assistant that operates this \
machine on the operator's behalf through the tools provided. Inspect before you change \
anything, prefer the smallest command that does the job, and answer in plain text once \
the request is done.";

/// Final text when a turn runs out of steps.
pub const STEP_LIMIT_MESSAGE: &str = "I reached the step limit for this request before \
finishing. Tell me how you would like to continue.";

const DEFAULT_MAX_STEPS: u32 = 15;
const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Opening and closing markers of model reasoning that never reaches the
/// operator.
const REASONING_TAGS: &[(&str, &str)] = &[("<think>", "</think>"), ("<thinking>", "</thinking>")];

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model produced a final answer.
    Completed,
    /// The step budget ran out first.
    StepLimit,
    /// Inference failed or returned nothing usable.
    Failed,
    /// The event receiver went away mid-turn.
    Cancelled,
}

/// The event consumer hung up.
#[derive(Debug)]
struct Cancelled;

async fn emit(events: &mpsc::Sender<AgentEvent>, event: AgentEvent) -> Result<(), Cancelled> {
    events.send(event).await.map_err(|_| Cancelled)
}

/// The core agent loop that orchestrates inference, safety checks and tool
/// execution for one transcript.
pub struct AgentLoop {
    /// The completion backend
    provider: Arc<dyn Provider>,

    /// Tool registry
    tools: Arc<ToolRegistry>,

    /// Risk gate applied to every tool call
    classifier: Arc<SafetyClassifier>,

    /// Keeps the transcript inside the token budget
    context: ContextManager,

    /// Index 0 is always the system message
    transcript: Vec<Message>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Max tokens per completion
    max_tokens: Option<u32>,

    /// Maximum inference calls per turn
    max_steps: u32,
}

impl std::fmt::Debug for AgentLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLoop")
            .field("provider", &self.provider.name())
            .field("tools", &self.tools.names())
            .field("classifier", &self.classifier)
            .field("context", &self.context)
            .field("messages", &self.transcript.len())
            .field("model", &self.model)
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

impl AgentLoop {
    /// Create a new agent loop with the default system prompt and limits.
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        classifier: Arc<SafetyClassifier>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            tools,
            classifier,
            context: ContextManager::from_config(&Default::default()),
            transcript: vec![Message::system(DEFAULT_SYSTEM_PROMPT)],
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Create an agent loop with limits, model and prompt taken from config.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        classifier: Arc<SafetyClassifier>,
        config: &AppConfig,
    ) -> Self {
        let agent = Self::new(provider, tools, classifier, &config.provider.model)
            .with_max_steps(config.agent.max_steps)
            .with_temperature(config.agent.temperature)
            .with_max_tokens(config.agent.max_tokens)
            .with_context_manager(ContextManager::from_config(&config.context));
        match &config.agent.system_prompt {
            Some(prompt) => agent.with_system_prompt(prompt),
            None => agent,
        }
    }

    /// Replace the system message.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.transcript[0] = Message::system(prompt);
        self
    }

    /// Set the maximum number of inference calls per turn.
    pub fn with_max_steps(mut self, max: u32) -> Self {
        self.max_steps = max;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the max tokens per completion.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_context_manager(mut self, context: ContextManager) -> Self {
        self.context = context;
        self
    }

    /// Read-only view of the transcript.
    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    pub fn context(&self) -> &ContextManager {
        &self.context
    }

    /// Forget everything but the system message.
    pub fn clear(&mut self) {
        self.transcript.truncate(1);
        debug!("Transcript cleared");
    }

    /// Force a trim pass. Returns the number of messages removed.
    pub fn compact(&mut self) -> usize {
        let before = self.context.trimmed_total();
        self.transcript = self.context.compact_messages(&self.transcript);
        self.context.trimmed_total() - before
    }

    /// Run one operator turn to completion.
    ///
    /// Every event goes through `events`; a full channel applies
    /// back-pressure, a closed one cancels the turn. Effects that already
    /// ran are kept and the transcript stays well-formed.
    pub async fn handle_user_message(
        &mut self,
        text: &str,
        confirm: &dyn ConfirmationHandler,
        events: &mpsc::Sender<AgentEvent>,
    ) -> TurnOutcome {
        info!(
            model = %self.model,
            messages = self.transcript.len(),
            "Handling user message"
        );
        self.transcript.push(Message::user(text));

        let outcome = match self.run_turn(confirm, events).await {
            Ok(outcome) => outcome,
            Err(Cancelled) => {
                warn!("Event receiver dropped, abandoning turn");
                TurnOutcome::Cancelled
            }
        };
        info!(?outcome, messages = self.transcript.len(), "Turn finished");
        outcome
    }

    async fn run_turn(
        &mut self,
        confirm: &dyn ConfirmationHandler,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<TurnOutcome, Cancelled> {
        let tool_definitions: Vec<ToolDefinition> = self.tools.definitions();

        for step in 1..=self.max_steps {
            self.transcript = self.context.trim_messages(&self.transcript);
            emit(events, AgentEvent::Thinking { step }).await?;
            debug!(step, messages = self.transcript.len(), "Agent loop step");

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: self.transcript.clone(),
                tools: tool_definitions.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            };

            let response = match self.provider.complete(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(step, error = %e, "Inference failed");
                    emit(
                        events,
                        AgentEvent::Error {
                            message: format!("Inference failed: {e}"),
                        },
                    )
                    .await?;
                    return Ok(TurnOutcome::Failed);
                }
            };

            let text = strip_reasoning(response.content.as_deref().unwrap_or_default());

            if response.tool_calls.is_empty() {
                if text.is_empty() {
                    let message = if response.finish_reason == FinishReason::Length {
                        "Response truncated: the model hit its token limit before answering"
                    } else {
                        "Empty response from the model"
                    };
                    warn!(step, finish_reason = ?response.finish_reason, "{message}");
                    emit(
                        events,
                        AgentEvent::Error {
                            message: message.into(),
                        },
                    )
                    .await?;
                    return Ok(TurnOutcome::Failed);
                }

                self.transcript.push(Message::assistant(text.clone()));
                emit(events, AgentEvent::Response { text }).await?;
                return Ok(TurnOutcome::Completed);
            }

            debug!(step, tool_count = response.tool_calls.len(), "Model requested tools");
            self.run_tool_calls(text, response.tool_calls, confirm, events)
                .await?;
        }

        warn!(max_steps = self.max_steps, "Step budget exhausted");
        emit(
            events,
            AgentEvent::Response {
                text: STEP_LIMIT_MESSAGE.into(),
            },
        )
        .await?;
        Ok(TurnOutcome::StepLimit)
    }

    /// Classify, confirm and dispatch the calls of one step, in order.
    async fn run_tool_calls(
        &mut self,
        text: String,
        calls: Vec<ToolCall>,
        confirm: &dyn ConfirmationHandler,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<(), Cancelled> {
        // Planning text rides on the first recorded call.
        let mut planning = None;
        if !text.is_empty() {
            emit(events, AgentEvent::PlanningText { text: text.clone() }).await?;
            planning = Some(text);
        }

        for call in calls {
            let assessment = self.assess(&call);
            match assessment.risk {
                Risk::Blocked => {
                    warn!(tool = %call.name, reason = %assessment.reason, "Tool call blocked");
                    emit(
                        events,
                        AgentEvent::Blocked {
                            call_id: call.id.clone(),
                            name: call.name.clone(),
                            reason: assessment.reason.clone(),
                        },
                    )
                    .await?;
                    let result = ToolResult::failure(
                        format!(
                            "Blocked by safety policy: {}. Do not retry this; try an alternative approach.",
                            assessment.reason
                        ),
                        EXIT_REFUSED,
                    );
                    self.record(planning.take(), call, &result);
                    continue;
                }
                Risk::Confirm => {
                    emit(
                        events,
                        AgentEvent::ConfirmNeeded {
                            call_id: call.id.clone(),
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        },
                    )
                    .await?;
                    if !confirm.confirm(&call).await {
                        info!(tool = %call.name, "Operator declined tool call");
                        let result = ToolResult::failure(
                            "The operator declined this action. Ask what they would prefer instead.",
                            EXIT_REFUSED,
                        );
                        self.record(planning.take(), call, &result);
                        continue;
                    }
                }
                Risk::Safe => {}
            }

            emit(
                events,
                AgentEvent::Executing {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            )
            .await?;

            let result = self.tools.execute_call(&call).await;
            debug!(tool = %call.name, exit_code = result.exit_code, "Tool finished");

            let event = AgentEvent::ToolResult {
                call_id: call.id.clone(),
                name: call.name.clone(),
                output: result.output.clone(),
                error: result.error.clone(),
                exit_code: result.exit_code,
                truncated: result.truncated,
            };
            self.record(planning.take(), call, &result);
            emit(events, event).await?;
        }
        Ok(())
    }

    /// The classifier's verdict, escalated for tools that always ask.
    fn assess(&self, call: &ToolCall) -> Assessment {
        let assessment = self.classifier.assess_tool_call(&call.name, &call.arguments);
        if assessment.risk == Risk::Safe && self.tools.requires_confirmation(&call.name) {
            let risk = self.classifier.apply_mode(Risk::Confirm);
            if risk != Risk::Safe {
                return Assessment {
                    risk,
                    reason: format!("{} always requires confirmation", call.name),
                };
            }
        }
        assessment
    }

    /// Append one call and its outcome as an adjacent assistant/tool pair.
    fn record(&mut self, planning: Option<String>, call: ToolCall, result: &ToolResult) {
        let id = call.id.clone();
        self.transcript
            .push(Message::assistant_tool_calls(planning, vec![call]));
        self.transcript
            .push(Message::tool_result(id, result.to_message_content()));
    }
}

/// Remove `<think>`/`<thinking>` blocks. An unterminated block swallows the
/// rest of the text.
pub fn strip_reasoning(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some((start, open, close)) = find_reasoning_open(rest) {
        out.push_str(&rest[..start]);
        let inner = &rest[start + open.len()..];
        match inner.find(close) {
            Some(end) => rest = &inner[end + close.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

fn find_reasoning_open(text: &str) -> Option<(usize, &'static str, &'static str)> {
    REASONING_TAGS
        .iter()
        .filter_map(|&(open, close)| text.find(open).map(|i| (i, open, close)))
        .min_by_key(|&(i, _, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::{AlwaysApprove, AlwaysDeny, ChannelConfirmer};
    use crate::context::CONTEXT_NOTE_HEADER;
    use crate::test_helpers::*;
    use clawshell_config::{SafetyConfig, SafetyMode};
    use clawshell_core::error::ProviderError;
    use clawshell_core::message::Role;
    use clawshell_core::provider::ProviderResponse;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Harness {
        agent: AgentLoop,
        provider: Arc<SequentialMockProvider>,
        shell_calls: Arc<AtomicUsize>,
        write_calls: Arc<AtomicUsize>,
    }

    fn harness(provider: SequentialMockProvider, mode: SafetyMode) -> Harness {
        let provider = Arc::new(provider);
        let (registry, shell_calls, write_calls) = mock_registry();
        let classifier = SafetyClassifier::new(&SafetyConfig {
            mode,
            ..SafetyConfig::default()
        })
        .unwrap();
        let agent = AgentLoop::new(
            provider.clone(),
            Arc::new(registry),
            Arc::new(classifier),
            "mock-model",
        );
        Harness {
            agent,
            provider,
            shell_calls,
            write_calls,
        }
    }

    async fn run(
        agent: &mut AgentLoop,
        text: &str,
        confirm: &dyn ConfirmationHandler,
    ) -> (TurnOutcome, Vec<AgentEvent>) {
        let (tx, mut rx) = mpsc::channel(64);
        let outcome = agent.handle_user_message(text, confirm, &tx).await;
        drop(tx);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (outcome, events)
    }

    fn types(events: &[AgentEvent]) -> Vec<&'static str> {
        events.iter().map(AgentEvent::event_type).collect()
    }

    fn write_call(id: &str) -> ToolCall {
        make_tool_call(
            id,
            "write_file",
            json!({ "path": "notes.txt", "content": "hello" }),
        )
    }

    #[tokio::test]
    async fn safe_shell_call_then_answer() {
        let mut h = harness(
            SequentialMockProvider::tool_then_answer(shell_call("call_1", "echo hi"), "done"),
            SafetyMode::Supervised,
        );

        let (outcome, events) = run(&mut h.agent, "run echo hi", &AlwaysDeny).await;

        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(
            types(&events),
            vec!["thinking", "executing", "tool_result", "thinking", "response"]
        );
        assert_eq!(
            events.last(),
            Some(&AgentEvent::Response {
                text: "done".into()
            })
        );
        assert_eq!(h.shell_calls.load(Ordering::SeqCst), 1);

        let transcript = h.agent.transcript();
        assert_eq!(transcript.len(), 5);
        let roles: Vec<Role> = transcript.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::System,
                Role::User,
                Role::Assistant,
                Role::Tool,
                Role::Assistant
            ]
        );
        assert_eq!(transcript[3].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(transcript[3].text(), "Exit code: 0\nhi");
    }

    #[tokio::test]
    async fn tool_result_event_carries_the_outcome() {
        let mut h = harness(
            SequentialMockProvider::tool_then_answer(shell_call("call_1", "echo hi"), "done"),
            SafetyMode::Supervised,
        );
        let (_, events) = run(&mut h.agent, "run echo hi", &AlwaysApprove).await;
        assert_eq!(
            events[2],
            AgentEvent::ToolResult {
                call_id: "call_1".into(),
                name: "shell".into(),
                output: "hi".into(),
                error: None,
                exit_code: 0,
                truncated: false,
            }
        );
    }

    #[tokio::test]
    async fn step_budget_bounds_inference_calls() {
        let mut h = harness(
            SequentialMockProvider::always(ProviderResponse::tool_calls(
                None,
                vec![shell_call("call_x", "echo again")],
            )),
            SafetyMode::Supervised,
        );
        h.agent = h.agent.with_max_steps(3);

        let (outcome, events) = run(&mut h.agent, "loop forever", &AlwaysApprove).await;

        assert_eq!(outcome, TurnOutcome::StepLimit);
        assert_eq!(h.provider.call_count(), 3);
        assert_eq!(h.shell_calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            events.last(),
            Some(&AgentEvent::Response {
                text: STEP_LIMIT_MESSAGE.into()
            })
        );
        // The notice is not part of the transcript
        assert_eq!(h.agent.transcript().last().map(|m| m.role), Some(Role::Tool));
    }

    #[tokio::test]
    async fn blocked_call_never_executes() {
        let mut h = harness(
            SequentialMockProvider::tool_then_answer(shell_call("call_1", "rm -rf /"), "ok"),
            SafetyMode::AutoApprove,
        );

        let (outcome, events) = run(&mut h.agent, "wipe it", &AlwaysApprove).await;

        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(h.shell_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            types(&events),
            vec!["thinking", "blocked", "thinking", "response"]
        );
        let tool_msg = &h.agent.transcript()[3];
        assert_eq!(tool_msg.role, Role::Tool);
        assert!(tool_msg.text().starts_with("Exit code: 126"));
        assert!(tool_msg.text().contains("alternative"));
    }

    #[tokio::test]
    async fn declined_call_is_recorded_not_run() {
        let mut h = harness(
            SequentialMockProvider::tool_then_answer(write_call("call_w"), "skipped"),
            SafetyMode::Supervised,
        );

        let (outcome, events) = run(&mut h.agent, "write a note", &AlwaysDeny).await;

        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(h.write_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            types(&events),
            vec!["thinking", "confirm_needed", "thinking", "response"]
        );
        let tool_msg = &h.agent.transcript()[3];
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_w"));
        assert!(tool_msg.text().contains("declined"));
    }

    #[tokio::test]
    async fn approved_call_runs_after_confirmation() {
        let mut h = harness(
            SequentialMockProvider::tool_then_answer(write_call("call_w"), "written"),
            SafetyMode::Supervised,
        );
        let (confirmer, mut requests) = ChannelConfirmer::new(1);
        let consumer = tokio::spawn(async move {
            let request = requests.recv().await.unwrap();
            assert_eq!(request.call.name, "write_file");
            request.approve();
        });

        let (outcome, events) = run(&mut h.agent, "write a note", &confirmer).await;
        consumer.await.unwrap();

        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(h.write_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            types(&events),
            vec![
                "thinking",
                "confirm_needed",
                "executing",
                "tool_result",
                "thinking",
                "response"
            ]
        );
    }

    #[tokio::test]
    async fn auto_approve_skips_confirmation() {
        let mut h = harness(
            SequentialMockProvider::tool_then_answer(write_call("call_w"), "written"),
            SafetyMode::AutoApprove,
        );
        let (_, events) = run(&mut h.agent, "write a note", &AlwaysDeny).await;
        assert_eq!(h.write_calls.load(Ordering::SeqCst), 1);
        assert!(!types(&events).contains(&"confirm_needed"));
    }

    #[tokio::test]
    async fn read_only_blocks_mutations() {
        let mut h = harness(
            SequentialMockProvider::tool_then_answer(write_call("call_w"), "cannot"),
            SafetyMode::ReadOnly,
        );
        let (_, events) = run(&mut h.agent, "write a note", &AlwaysApprove).await;
        assert_eq!(h.write_calls.load(Ordering::SeqCst), 0);
        let AgentEvent::Blocked { reason, .. } = &events[1] else {
            panic!("expected blocked, got {:?}", events[1]);
        };
        assert!(reason.contains("read_only"));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_to_the_model() {
        let mut h = harness(
            SequentialMockProvider::tool_then_answer(
                make_tool_call("call_u", "teleport", json!({})),
                "sorry",
            ),
            SafetyMode::AutoApprove,
        );
        let (outcome, events) = run(&mut h.agent, "teleport me", &AlwaysDeny).await;
        assert_eq!(outcome, TurnOutcome::Completed);
        let AgentEvent::ToolResult {
            exit_code, error, ..
        } = &events[2]
        else {
            panic!("expected tool_result, got {:?}", events[2]);
        };
        assert_eq!(*exit_code, 127);
        assert!(error.as_deref().is_some_and(|e| e.contains("teleport")));
        assert!(h.agent.transcript()[3].text().contains("teleport"));
    }

    #[tokio::test]
    async fn unknown_tool_needs_confirmation_when_supervised() {
        let mut h = harness(
            SequentialMockProvider::tool_then_answer(
                make_tool_call("call_u", "teleport", json!({})),
                "sorry",
            ),
            SafetyMode::Supervised,
        );
        let (_, events) = run(&mut h.agent, "teleport me", &AlwaysDeny).await;
        assert_eq!(
            types(&events),
            vec!["thinking", "confirm_needed", "thinking", "response"]
        );
    }

    #[tokio::test]
    async fn multiple_calls_are_recorded_as_pairs() {
        let mut h = harness(
            SequentialMockProvider::new(vec![
                ProviderResponse::tool_calls(
                    Some("<think>plan</think>Checking two things.".into()),
                    vec![shell_call("a", "echo one"), shell_call("b", "echo two")],
                ),
                make_text_response("both done"),
            ]),
            SafetyMode::Supervised,
        );

        let (_, events) = run(&mut h.agent, "check", &AlwaysDeny).await;

        assert_eq!(
            events[1],
            AgentEvent::PlanningText {
                text: "Checking two things.".into()
            }
        );
        let t = h.agent.transcript();
        assert_eq!(t.len(), 7);
        assert_eq!(t[2].text(), "Checking two things.");
        assert_eq!(t[2].tool_calls[0].id, "a");
        assert_eq!(t[3].tool_call_id.as_deref(), Some("a"));
        assert_eq!(t[4].text(), "");
        assert_eq!(t[4].tool_calls[0].id, "b");
        assert_eq!(t[5].tool_call_id.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn truncated_response_is_an_error() {
        let truncated = ProviderResponse {
            content: Some("<think>still reasoning about the".into()),
            finish_reason: FinishReason::Length,
            ..ProviderResponse::default()
        };
        let mut h = harness(
            SequentialMockProvider::new(vec![truncated]),
            SafetyMode::Supervised,
        );

        let (outcome, events) = run(&mut h.agent, "hello", &AlwaysDeny).await;

        assert_eq!(outcome, TurnOutcome::Failed);
        assert_eq!(types(&events), vec!["thinking", "error"]);
        let AgentEvent::Error { message } = &events[1] else {
            unreachable!()
        };
        assert!(message.contains("truncated"));
        assert_eq!(h.agent.transcript().len(), 2);
    }

    #[tokio::test]
    async fn empty_response_is_an_error() {
        let mut h = harness(
            SequentialMockProvider::new(vec![ProviderResponse::default()]),
            SafetyMode::Supervised,
        );
        let (outcome, events) = run(&mut h.agent, "hello", &AlwaysDeny).await;
        assert_eq!(outcome, TurnOutcome::Failed);
        assert_eq!(
            events.last(),
            Some(&AgentEvent::Error {
                message: "Empty response from the model".into()
            })
        );
    }

    #[tokio::test]
    async fn inference_failure_ends_the_turn() {
        let mut h = harness(
            SequentialMockProvider::scripted(vec![Err(ProviderError::Network(
                "connection refused".into(),
            ))]),
            SafetyMode::Supervised,
        );
        let (outcome, events) = run(&mut h.agent, "hello", &AlwaysDeny).await;
        assert_eq!(outcome, TurnOutcome::Failed);
        let AgentEvent::Error { message } = &events[1] else {
            panic!("expected error, got {:?}", events[1]);
        };
        assert!(message.contains("connection refused"));
        assert_eq!(h.provider.call_count(), 1);
    }

    #[tokio::test]
    async fn dropped_receiver_cancels_the_turn() {
        let mut h = harness(
            SequentialMockProvider::tool_then_answer(shell_call("c", "echo hi"), "done"),
            SafetyMode::Supervised,
        );
        let (tx, rx) = mpsc::channel(8);
        drop(rx);

        let outcome = h.agent.handle_user_message("hi", &AlwaysDeny, &tx).await;

        assert_eq!(outcome, TurnOutcome::Cancelled);
        assert_eq!(h.provider.call_count(), 0);
        assert_eq!(h.shell_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.agent.transcript().len(), 2);
    }

    #[tokio::test]
    async fn request_carries_tools_and_settings() {
        let mut h = harness(
            SequentialMockProvider::new(vec![make_text_response("hi")]),
            SafetyMode::Supervised,
        );
        h.agent = h.agent.with_temperature(0.7).with_max_tokens(256);
        run(&mut h.agent, "hello", &AlwaysDeny).await;

        let request = &h.provider.requests()[0];
        assert_eq!(request.model, "mock-model");
        assert_eq!(request.max_tokens, Some(256));
        assert!((request.temperature - 0.7).abs() < f32::EPSILON);
        let names: Vec<&str> = request.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["shell", "write_file"]);
        assert_eq!(request.messages.len(), 2);
    }

    #[tokio::test]
    async fn transcript_is_trimmed_before_inference() {
        let long = "x".repeat(300);
        let mut h = harness(
            SequentialMockProvider::always(make_text_response(&long)),
            SafetyMode::Supervised,
        );
        h.agent = h.agent.with_context_manager(ContextManager::new(50));

        for i in 0..5 {
            let (outcome, _) = run(&mut h.agent, &format!("question {i}"), &AlwaysDeny).await;
            assert_eq!(outcome, TurnOutcome::Completed);
        }

        let last = h.provider.requests().pop().unwrap();
        assert_eq!(last.messages[0].role, Role::System);
        assert!(last.messages[1].text().starts_with(CONTEXT_NOTE_HEADER));
        assert!(h.agent.context().trimmed_total() > 0);
    }

    #[tokio::test]
    async fn clear_keeps_only_the_system_message() {
        let mut h = harness(
            SequentialMockProvider::new(vec![make_text_response("hi")]),
            SafetyMode::Supervised,
        );
        h.agent = h.agent.with_system_prompt("be brief");
        run(&mut h.agent, "hello", &AlwaysDeny).await;
        assert_eq!(h.agent.transcript().len(), 3);

        h.agent.clear();
        assert_eq!(h.agent.transcript().len(), 1);
        assert_eq!(h.agent.transcript()[0].text(), "be brief");
    }

    #[tokio::test]
    async fn compact_reports_removed_messages() {
        let mut h = harness(
            SequentialMockProvider::always(make_text_response("ok")),
            SafetyMode::Supervised,
        );
        for i in 0..5 {
            run(&mut h.agent, &format!("q{i}"), &AlwaysDeny).await;
        }
        assert_eq!(h.agent.transcript().len(), 11);

        assert_eq!(h.agent.compact(), 4);
        let t = h.agent.transcript();
        assert_eq!(t.len(), 8);
        assert!(t[1].text().starts_with(CONTEXT_NOTE_HEADER));

        // Nothing left to drop
        assert_eq!(h.agent.compact(), 0);
    }

    #[test]
    fn from_config_applies_settings() {
        let mut config = AppConfig::default();
        config.agent.max_steps = 4;
        config.agent.system_prompt = Some("custom".into());
        config.provider.model = "local-model".into();
        let (registry, _, _) = mock_registry();
        let agent = AgentLoop::from_config(
            Arc::new(SequentialMockProvider::new(vec![])),
            Arc::new(registry),
            Arc::new(SafetyClassifier::new(&config.safety).unwrap()),
            &config,
        );
        assert_eq!(agent.max_steps(), 4);
        assert_eq!(agent.model(), "local-model");
        assert_eq!(agent.transcript()[0].text(), "custom");
        assert_eq!(agent.context().budget(), config.context.token_budget);
    }

    #[test]
    fn strip_reasoning_blocks() {
        assert_eq!(strip_reasoning("plain"), "plain");
        assert_eq!(strip_reasoning("<think>hmm</think> answer "), "answer");
        assert_eq!(
            strip_reasoning("a <thinking>x</thinking>b<think>y</think> c"),
            "a b c"
        );
        assert_eq!(strip_reasoning("before <think>never closed"), "before");
        assert_eq!(strip_reasoning("<think>only reasoning</think>"), "");
    }
}
