//! Rolling transcript budget.
//!
//! When the transcript grows past its token budget, the oldest droppable
//! messages are removed and replaced by one synthetic system note holding an
//! extractive summary of what was dropped.
//!
//! Layout after a trim:
//!
//! | Part | Source | Trim strategy |
//! |------|--------|---------------|
//! | System message | index 0 | Never trimmed |
//! | Context note | dropped units (and any earlier note) | Rebuilt each trim |
//! | Middle | older turns | Oldest units dropped first |
//! | Trailing window | last 6 messages | Never trimmed |
//!
//! An assistant message carrying tool calls and the tool results that
//! follow it form one unit: they are kept or dropped together.

use super::token::{TokenEstimator, TokenizerFn};
use clawshell_config::ContextConfig;
use clawshell_core::message::{Message, Role};
use clawshell_core::names;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// Messages at the end of the transcript that are never dropped.
pub const TRAILING_WINDOW: usize = 6;

/// Tokens kept free for the context note when trimming.
pub const DEFAULT_SUMMARY_RESERVE: usize = 200;

const MAX_FACTS: usize = 15;
const MAX_SUMMARY_CHARS: usize = 500;
const USER_FACT_CHARS: usize = 100;
const COMMAND_FACT_CHARS: usize = 80;

/// First line of every context note.
pub const CONTEXT_NOTE_HEADER: &str =
    "[Context note] Earlier messages were removed to fit the context window. Summary:";

/// Estimates transcript cost and trims it to a token budget.
#[derive(Debug)]
pub struct ContextManager {
    budget: usize,
    summary_reserve: usize,
    estimator: TokenEstimator,
    trimmed_total: AtomicUsize,
}

impl ContextManager {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            summary_reserve: DEFAULT_SUMMARY_RESERVE,
            estimator: TokenEstimator::default(),
            trimmed_total: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(config.token_budget).with_summary_reserve(config.summary_reserve_tokens)
    }

    pub fn with_summary_reserve(mut self, reserve: usize) -> Self {
        self.summary_reserve = reserve;
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: TokenizerFn) -> Self {
        self.estimator = TokenEstimator::with_tokenizer(tokenizer);
        self
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Total messages removed over this manager's lifetime.
    pub fn trimmed_total(&self) -> usize {
        self.trimmed_total.load(Ordering::Relaxed)
    }

    pub fn estimate_tokens(&self, messages: &[Message]) -> usize {
        self.estimator.estimate_messages(messages)
    }

    /// Fit `messages` into the budget. Returns them unchanged when they
    /// already fit.
    pub fn trim_messages(&self, messages: &[Message]) -> Vec<Message> {
        if messages.len() < 2 {
            return messages.to_vec();
        }
        let total = self.estimate_tokens(messages);
        if total <= self.budget {
            return messages.to_vec();
        }
        let threshold = self.budget.saturating_sub(self.summary_reserve);
        self.trim_to(messages, Some(threshold), total)
    }

    /// Drop every droppable unit regardless of budget, keeping the system
    /// message and the trailing window.
    pub fn compact_messages(&self, messages: &[Message]) -> Vec<Message> {
        if messages.len() < 2 {
            return messages.to_vec();
        }
        let total = self.estimate_tokens(messages);
        self.trim_to(messages, None, total)
    }

    /// Shared trim pass. With `threshold == None` every unit is dropped.
    fn trim_to(
        &self,
        messages: &[Message],
        threshold: Option<usize>,
        total: usize,
    ) -> Vec<Message> {
        let system = &messages[0];
        let body = &messages[1..];
        if body.len() <= TRAILING_WINDOW {
            return messages.to_vec();
        }

        // Never start the protected window on an orphaned tool result.
        let mut tail_start = body.len() - TRAILING_WINDOW;
        while tail_start > 0 && body[tail_start].role == Role::Tool {
            tail_start -= 1;
        }
        let (middle, tail) = body.split_at(tail_start);
        if middle.is_empty() {
            return messages.to_vec();
        }

        let mut carried = Vec::new();
        let mut units: Vec<&[Message]> = Vec::new();
        for unit in group_units(middle) {
            match previous_note_facts(unit) {
                Some(facts) => carried.extend(facts),
                None => units.push(unit),
            }
        }

        let mut remaining = self.estimator.estimate_message(system)
            + self.estimate_tokens(tail)
            + units.iter().map(|u| self.estimate_tokens(u)).sum::<usize>();

        let mut dropped_units = 0;
        for unit in &units {
            if let Some(threshold) = threshold
                && remaining <= threshold
            {
                break;
            }
            remaining -= self.estimate_tokens(unit);
            dropped_units += 1;
        }

        if dropped_units == 0 && carried.is_empty() {
            return messages.to_vec();
        }

        let (dropped, kept) = units.split_at(dropped_units);
        let dropped_messages: usize = dropped.iter().map(|u| u.len()).sum();

        let mut facts = carried;
        for unit in dropped {
            facts.extend(unit_facts(unit));
        }
        let note = Message::system(format!("{CONTEXT_NOTE_HEADER}\n{}", render_summary(&facts)));

        let kept_len: usize = kept.iter().map(|u| u.len()).sum();
        let mut out = Vec::with_capacity(2 + kept_len + tail.len());
        out.push(system.clone());
        out.push(note);
        for unit in kept {
            out.extend_from_slice(unit);
        }
        out.extend_from_slice(tail);

        let lifetime = self
            .trimmed_total
            .fetch_add(dropped_messages, Ordering::Relaxed)
            + dropped_messages;
        info!(
            before_tokens = total,
            after_tokens = self.estimate_tokens(&out),
            dropped_messages,
            lifetime_trimmed = lifetime,
            "Trimmed transcript"
        );

        out
    }
}

/// Split `middle` into atomic units: an assistant message with tool calls
/// plus the tool results right after it, or any other single message.
fn group_units(middle: &[Message]) -> Vec<&[Message]> {
    let mut units = Vec::new();
    let mut i = 0;
    while i < middle.len() {
        let mut end = i + 1;
        if middle[i].has_tool_calls() {
            while end < middle.len() && middle[end].role == Role::Tool {
                end += 1;
            }
        }
        units.push(&middle[i..end]);
        i = end;
    }
    units
}

/// If `unit` is an earlier context note, return the facts it carried.
fn previous_note_facts(unit: &[Message]) -> Option<Vec<String>> {
    let [message] = unit else {
        return None;
    };
    if message.role != Role::System {
        return None;
    }
    let body = message.text().strip_prefix(CONTEXT_NOTE_HEADER)?;
    Some(
        body.lines()
            .filter_map(|line| line.strip_prefix("- "))
            .map(str::to_string)
            .collect(),
    )
}

fn unit_facts(unit: &[Message]) -> Vec<String> {
    let mut facts = Vec::new();
    for message in unit {
        match message.role {
            Role::User => {
                facts.push(format!("User asked: {}", clip(message.text(), USER_FACT_CHARS)));
            }
            Role::Assistant => {
                for call in &message.tool_calls {
                    match (call.name.as_str(), call.str_arg("command")) {
                        (names::SHELL, Some(command)) => {
                            facts.push(format!("Ran: {}", clip(command, COMMAND_FACT_CHARS)));
                        }
                        (name, _) => facts.push(format!("Called: {name}")),
                    }
                }
            }
            Role::Tool => {
                if let Some(line) = message
                    .text()
                    .lines()
                    .next()
                    .filter(|l| l.starts_with("Exit code:"))
                {
                    facts.push(line.trim().to_string());
                }
            }
            Role::System => {}
        }
    }
    facts
}

fn render_summary(facts: &[String]) -> String {
    let mut summary = facts
        .iter()
        .take(MAX_FACTS)
        .map(|f| format!("- {f}"))
        .collect::<Vec<_>>()
        .join("\n");
    if facts.len() > MAX_FACTS {
        summary.push_str("\n...");
    }
    if summary.chars().count() > MAX_SUMMARY_CHARS {
        summary = summary.chars().take(MAX_SUMMARY_CHARS - 3).collect();
        summary.push_str("...");
    }
    debug!(facts = facts.len(), chars = summary.len(), "Built context summary");
    summary
}

/// First `max` characters of the first line of `text`.
fn clip(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default().trim();
    line.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawshell_core::tool::{Arguments, ToolCall};
    use std::sync::Arc;

    fn shell_call(id: &str, command: &str) -> ToolCall {
        let mut args = Arguments::new();
        args.insert("command".into(), command.into());
        ToolCall::new(id, "shell", args)
    }

    /// system + `turns` x [user, assistant(call), tool, assistant text]
    fn transcript(turns: usize, filler: usize) -> Vec<Message> {
        let pad = "x".repeat(filler);
        let mut msgs = vec![Message::system("You are a shell assistant.")];
        for i in 0..turns {
            msgs.push(Message::user(format!("request {i} {pad}")));
            msgs.push(Message::assistant_tool_calls(
                None,
                vec![shell_call(&format!("c{i}"), &format!("echo {i}"))],
            ));
            msgs.push(Message::tool_result(format!("c{i}"), format!("Exit code: 0\n{i} {pad}")));
            msgs.push(Message::assistant(format!("done {i} {pad}")));
        }
        msgs
    }

    fn assert_pairing(messages: &[Message]) {
        for (i, m) in messages.iter().enumerate() {
            if m.has_tool_calls() {
                for (j, call) in m.tool_calls.iter().enumerate() {
                    let next = messages
                        .get(i + 1 + j)
                        .unwrap_or_else(|| panic!("call {} has no result", call.id));
                    assert_eq!(next.role, Role::Tool);
                    assert_eq!(next.tool_call_id.as_deref(), Some(call.id.as_str()));
                }
            }
        }
    }

    #[test]
    fn within_budget_is_identity() {
        let cm = ContextManager::new(100_000);
        let msgs = transcript(5, 10);
        assert_eq!(cm.trim_messages(&msgs), msgs);
        assert_eq!(cm.trimmed_total(), 0);
    }

    #[test]
    fn identity_is_idempotent() {
        let cm = ContextManager::new(100_000);
        let msgs = transcript(3, 10);
        let once = cm.trim_messages(&msgs);
        assert_eq!(cm.trim_messages(&once), once);
    }

    #[test]
    fn short_transcripts_are_never_trimmed() {
        let cm = ContextManager::new(1).with_summary_reserve(0);
        let single = vec![Message::system("s".repeat(300))];
        assert_eq!(cm.trim_messages(&single), single);

        // System plus only the trailing window
        let msgs: Vec<Message> = std::iter::once(Message::system("s"))
            .chain((0..6).map(|i| Message::user(format!("{i} {}", "y".repeat(90)))))
            .collect();
        assert_eq!(cm.trim_messages(&msgs), msgs);
    }

    #[test]
    fn over_budget_keeps_system_and_trailing_window() {
        let msgs = transcript(10, 60);
        let cm = ContextManager::new(300).with_summary_reserve(50);
        assert!(cm.estimate_tokens(&msgs) > 300);

        let trimmed = cm.trim_messages(&msgs);
        assert!(trimmed.len() < msgs.len());
        assert_eq!(trimmed[0], msgs[0]);
        assert_eq!(trimmed[1].role, Role::System);
        assert!(trimmed[1].text().starts_with(CONTEXT_NOTE_HEADER));
        assert_eq!(trimmed[trimmed.len() - 6..], msgs[msgs.len() - 6..]);
        assert_pairing(&trimmed);
        assert!(cm.trimmed_total() > 0);
    }

    #[test]
    fn summary_lists_extracted_facts() {
        let msgs = transcript(10, 60);
        let cm = ContextManager::new(300).with_summary_reserve(50);
        let trimmed = cm.trim_messages(&msgs);
        let note = trimmed[1].text();
        assert!(note.contains("- User asked: request 0"), "{note}");
        assert!(note.contains("- Ran: echo 0"), "{note}");
        assert!(note.contains("- Exit code: 0"), "{note}");
    }

    #[test]
    fn stops_dropping_once_under_threshold() {
        let msgs = transcript(20, 60);
        let cm = ContextManager::new(1_000).with_summary_reserve(100);
        let trimmed = cm.trim_messages(&msgs);
        let body = &trimmed[2..];
        // Budget allows a few turns beyond the trailing window
        assert!(body.len() > 6, "kept {}", body.len());
        let without_note: Vec<Message> = std::iter::once(trimmed[0].clone())
            .chain(body.iter().cloned())
            .collect();
        assert!(cm.estimate_tokens(&without_note) <= 900);
    }

    #[test]
    fn trailing_window_widens_over_tool_results() {
        // [sys, u, a(call), a(call2)... ] arranged so the window starts on a tool result
        let mut msgs = vec![Message::system("sys")];
        for i in 0..4 {
            msgs.push(Message::user(format!("q{i} {}", "p".repeat(200))));
        }
        msgs.push(Message::assistant_tool_calls(
            None,
            vec![shell_call("a", "ls"), shell_call("b", "pwd")],
        ));
        msgs.push(Message::tool_result("a", "Exit code: 0\nfile"));
        msgs.push(Message::tool_result("b", "Exit code: 0\n/home"));
        for i in 0..4 {
            msgs.push(Message::user(format!("r{i}")));
        }

        let cm = ContextManager::new(50).with_summary_reserve(10);
        let trimmed = cm.trim_messages(&msgs);
        assert_pairing(&trimmed);
        // The assistant message owning the results survives with them
        assert!(trimmed.iter().any(|m| m.has_tool_calls()));
        assert_eq!(trimmed[trimmed.len() - 4..], msgs[msgs.len() - 4..]);
    }

    #[test]
    fn previous_note_facts_are_carried_forward() {
        let msgs = transcript(10, 60);
        let cm = ContextManager::new(300).with_summary_reserve(50);
        let first = cm.trim_messages(&msgs);

        let mut extended = first.clone();
        for i in 10..14 {
            extended.push(Message::user(format!("later {i} {}", "z".repeat(60))));
            extended.push(Message::assistant(format!("ok {i} {}", "z".repeat(60))));
        }
        let second = cm.trim_messages(&extended);

        let notes: Vec<&Message> = second
            .iter()
            .filter(|m| m.text().starts_with(CONTEXT_NOTE_HEADER))
            .collect();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].text().contains("User asked: request 0"));
    }

    #[test]
    fn summary_is_capped() {
        let facts: Vec<String> = (0..40).map(|i| format!("Called: tool_{i}")).collect();
        let summary = render_summary(&facts);
        assert_eq!(summary.lines().filter(|l| l.starts_with("- ")).count(), MAX_FACTS);
        assert!(summary.ends_with("..."));

        let long: Vec<String> = (0..10).map(|_| "y".repeat(100)).collect();
        let summary = render_summary(&long);
        assert_eq!(summary.chars().count(), MAX_SUMMARY_CHARS);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn facts_for_non_shell_calls_and_long_inputs() {
        let mut args = Arguments::new();
        args.insert("path".into(), "a.txt".into());
        let unit = vec![
            Message::user("u".repeat(150)),
            Message::assistant_tool_calls(None, vec![ToolCall::new("c", "read_file", args)]),
            Message::tool_result("c", "Exit code: 1\nError: nope"),
        ];
        let facts = unit_facts(&unit[0..1]);
        assert_eq!(facts, vec![format!("User asked: {}", "u".repeat(100))]);
        let facts = unit_facts(&unit[1..]);
        assert_eq!(facts, vec!["Called: read_file".to_string(), "Exit code: 1".to_string()]);
    }

    #[test]
    fn compact_drops_everything_droppable() {
        let msgs = transcript(5, 0);
        let cm = ContextManager::new(100_000);
        let compacted = cm.compact_messages(&msgs);
        // The window would start on a tool result, so it widens to 7
        assert_eq!(compacted.len(), 2 + 7);
        assert_eq!(compacted[2..], msgs[msgs.len() - 7..]);
        assert_eq!(cm.trimmed_total(), msgs.len() - 1 - 7);
        assert_pairing(&compacted);
    }

    #[test]
    fn exact_tokenizer_drives_the_budget() {
        // Every message costs 10 tokens under the tokenizer
        let cm = ContextManager::new(95)
            .with_summary_reserve(0)
            .with_tokenizer(Arc::new(|_text: &str| Some(10)));
        let msgs = transcript(3, 0); // 13 messages = 130 tokens
        let trimmed = cm.trim_messages(&msgs);
        assert!(cm.estimate_tokens(&trimmed) <= 95 + 10);
        assert_eq!(trimmed[0], msgs[0]);
    }
}
