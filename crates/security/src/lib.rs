//! Security module for clawshell: deciding whether a proposed action runs,
//! needs the operator's approval, or is refused.
//!
//! Provides:
//! - **Risk**: the three-way verdict (`Safe`, `Confirm`, `Blocked`)
//! - **SafetyClassifier**: regex-driven command screening plus per-tool rules
//! - **SafetyMode**: operator-selected adjustment of verdicts

pub mod classifier;

pub use clawshell_config::SafetyMode;
pub use classifier::{Assessment, Risk, SafetyClassifier, SecurityError};
