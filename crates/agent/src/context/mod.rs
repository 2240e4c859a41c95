//! Transcript budgeting: token estimation and trimming.

pub mod manager;
pub mod token;

pub use manager::{CONTEXT_NOTE_HEADER, ContextManager, DEFAULT_SUMMARY_RESERVE, TRAILING_WINDOW};
pub use token::{TokenEstimator, TokenizerFn, heuristic_tokens};
