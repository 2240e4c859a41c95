//! The agent loop for clawshell.
//!
//! Each operator turn follows an **infer → classify → confirm → act →
//! observe** cycle:
//!
//! 1. **Receive** an operator message and append it to the transcript
//! 2. **Fit context**: trim the transcript to the token budget
//! 3. **Infer** via the configured provider
//! 4. **If tool calls**: classify each, ask the operator where needed,
//!    dispatch through the registry, record the outcome, loop back to 2
//! 5. **If text**: that is the answer, and the turn ends
//!
//! The loop also stops on inference errors, truncated or empty responses,
//! or when the step budget runs out. Progress is reported as
//! [`AgentEvent`]s over a bounded channel.

pub mod confirm;
pub mod context;
pub mod loop_runner;
pub mod stream_event;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use confirm::{AlwaysApprove, AlwaysDeny, ChannelConfirmer, ConfirmationHandler, ConfirmationRequest};
pub use context::{CONTEXT_NOTE_HEADER, ContextManager, TokenEstimator, TokenizerFn};
pub use loop_runner::{AgentLoop, DEFAULT_SYSTEM_PROMPT, STEP_LIMIT_MESSAGE, TurnOutcome, strip_reasoning};
pub use stream_event::AgentEvent;
