//! Operator confirmation for risky tool calls.
//!
//! The loop awaits [`ConfirmationHandler::confirm`] inline, so it never
//! moves past a confirmation point before the operator has answered.

use async_trait::async_trait;
use clawshell_core::tool::ToolCall;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Decides whether a tool call that needs approval may run.
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    /// `true` approves the call, `false` declines it.
    async fn confirm(&self, call: &ToolCall) -> bool;
}

/// Approves everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysApprove;

#[async_trait]
impl ConfirmationHandler for AlwaysApprove {
    async fn confirm(&self, _call: &ToolCall) -> bool {
        true
    }
}

/// Declines everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysDeny;

#[async_trait]
impl ConfirmationHandler for AlwaysDeny {
    async fn confirm(&self, _call: &ToolCall) -> bool {
        false
    }
}

/// A pending decision handed to whoever consumes a [`ChannelConfirmer`].
#[derive(Debug)]
pub struct ConfirmationRequest {
    pub call: ToolCall,
    pub respond: oneshot::Sender<bool>,
}

impl ConfirmationRequest {
    pub fn approve(self) {
        let _ = self.respond.send(true);
    }

    pub fn deny(self) {
        let _ = self.respond.send(false);
    }
}

/// Forwards each decision to a consumer task over a channel.
///
/// If the consumer is gone, or drops a request without answering, the
/// call is declined.
#[derive(Debug, Clone)]
pub struct ChannelConfirmer {
    tx: mpsc::Sender<ConfirmationRequest>,
}

impl ChannelConfirmer {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ConfirmationRequest>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ConfirmationHandler for ChannelConfirmer {
    async fn confirm(&self, call: &ToolCall) -> bool {
        let (respond, answer) = oneshot::channel();
        let request = ConfirmationRequest {
            call: call.clone(),
            respond,
        };
        if self.tx.send(request).await.is_err() {
            debug!(call_id = %call.id, "Confirmation consumer gone, declining");
            return false;
        }
        answer.await.unwrap_or(false)
    }
}
