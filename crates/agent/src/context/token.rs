//! Token estimation utilities.
//!
//! An exact tokenizer can be plugged in as a callback. Without one, or when
//! it declines a text, a character heuristic is used: roughly 3 characters
//! per token, which errs on the high side for code and shell output.

use clawshell_core::message::Message;
use std::sync::Arc;

/// Exact token counter. Returning `None` falls back to the heuristic.
pub type TokenizerFn = Arc<dyn Fn(&str) -> Option<usize> + Send + Sync>;

/// Estimate the token count for a string: `max(1, chars / 3)`.
pub fn heuristic_tokens(text: &str) -> usize {
    (text.chars().count() / 3).max(1)
}

/// Everything in a message that costs context: its text, plus the names and
/// serialized arguments of any tool calls it carries.
pub fn message_text(message: &Message) -> String {
    let mut text = message.text().to_string();
    for call in &message.tool_calls {
        text.push_str(&call.name);
        text.push_str(&call.arguments_text());
    }
    text
}

/// Per-message token estimator.
#[derive(Clone, Default)]
pub struct TokenEstimator {
    tokenizer: Option<TokenizerFn>,
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEstimator")
            .field("tokenizer", &self.tokenizer.is_some())
            .finish()
    }
}

impl TokenEstimator {
    /// Use an exact tokenizer where it answers.
    pub fn with_tokenizer(tokenizer: TokenizerFn) -> Self {
        Self {
            tokenizer: Some(tokenizer),
        }
    }

    pub fn estimate_message(&self, message: &Message) -> usize {
        let text = message_text(message);
        if let Some(tokenizer) = &self.tokenizer
            && let Some(count) = tokenizer(&text)
        {
            return count;
        }
        heuristic_tokens(&text)
    }

    pub fn estimate_messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.estimate_message(m)).sum()
    }
}
