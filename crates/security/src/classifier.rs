//! Risk classification for shell commands and tool calls.
//!
//! Every proposed action gets one of three verdicts. Shell commands are
//! screened against ordered regex lists from configuration, then against a
//! few built-in rules (`sudo`, writes into system directories). Other tools
//! are classified by name. The configured [`SafetyMode`] is applied last and
//! can relax or tighten `Confirm`, but never lifts `Blocked`.

use clawshell_config::{SafetyConfig, SafetyMode};
use clawshell_core::names;
use clawshell_core::tool::Arguments;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Path prefixes that shell output must not be redirected into without
/// the operator's approval.
const RESERVED_PREFIXES: &[&str] = &[
    "/etc", "/usr", "/bin", "/sbin", "/boot", "/lib", "/lib64", "/sys", "/proc", "/dev", "/var",
    "/opt", "/root",
];

/// Sinks under reserved prefixes that are always fine to write to.
const EXEMPT_SINKS: &[&str] = &["/dev/null", "/dev/stdout", "/dev/stderr"];

/// `>`, `>>` or `tee [-flags]` followed by an absolute path.
const REDIRECT_PATTERN: &str = r#"(?:>>?|\btee\b(?:\s+-[A-Za-z-]+)*)\s*["']?(/[^\s;|&"'<>()]*)"#;

/// Verdict on a proposed action, ordered from least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Risk {
    /// Run without asking
    Safe,
    /// Ask the operator first
    Confirm,
    /// Never run
    Blocked,
}

impl std::fmt::Display for Risk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Safe => "safe",
            Self::Confirm => "confirm",
            Self::Blocked => "blocked",
        })
    }
}

/// A verdict together with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub risk: Risk,
    pub reason: String,
}

impl Assessment {
    fn new(risk: Risk, reason: impl Into<String>) -> Self {
        Self {
            risk,
            reason: reason.into(),
        }
    }
}

/// Errors raised while building a classifier.
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("Invalid {list} pattern '{pattern}': {reason}")]
    InvalidPattern {
        list: &'static str,
        pattern: String,
        reason: String,
    },
}

struct CompiledPattern {
    source: String,
    regex: Regex,
}

/// Pure, deterministic risk classifier. Immutable after construction.
pub struct SafetyClassifier {
    mode: SafetyMode,
    blocked: Vec<CompiledPattern>,
    confirm: Vec<CompiledPattern>,
    redirect: Regex,
}

impl std::fmt::Debug for SafetyClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyClassifier")
            .field("mode", &self.mode)
            .field("blocked_patterns", &self.blocked.len())
            .field("confirm_patterns", &self.confirm.len())
            .finish()
    }
}

fn compile(list: &'static str, patterns: &[String]) -> Result<Vec<CompiledPattern>, SecurityError> {
    patterns
        .iter()
        .map(|source| {
            Regex::new(source)
                .map(|regex| CompiledPattern {
                    source: source.clone(),
                    regex,
                })
                .map_err(|e| SecurityError::InvalidPattern {
                    list,
                    pattern: source.clone(),
                    reason: e.to_string(),
                })
        })
        .collect()
}

impl SafetyClassifier {
    /// Compile the configured pattern lists. Fails on the first invalid regex.
    pub fn new(config: &SafetyConfig) -> Result<Self, SecurityError> {
        let blocked = compile("blocked", &config.blocked_patterns)?;
        let confirm = compile("confirm", &config.confirm_patterns)?;
        let redirect = Regex::new(REDIRECT_PATTERN).map_err(|e| SecurityError::InvalidPattern {
            list: "redirect",
            pattern: REDIRECT_PATTERN.into(),
            reason: e.to_string(),
        })?;

        debug!(
            mode = %config.mode,
            blocked = blocked.len(),
            confirm = confirm.len(),
            "Safety classifier ready"
        );

        Ok(Self {
            mode: config.mode,
            blocked,
            confirm,
            redirect,
        })
    }

    pub fn mode(&self) -> SafetyMode {
        self.mode
    }

    /// Adjust a raw verdict for the configured mode.
    pub fn apply_mode(&self, risk: Risk) -> Risk {
        match (risk, self.mode) {
            (Risk::Confirm, SafetyMode::AutoApprove) => Risk::Safe,
            (Risk::Confirm, SafetyMode::ReadOnly) => Risk::Blocked,
            (risk, _) => risk,
        }
    }

    /// Classify a shell command, mode applied.
    pub fn classify_command(&self, command: &str) -> Risk {
        self.assess_command(command).risk
    }

    /// Classify a tool call by tool name and arguments, mode applied.
    pub fn classify_tool_call(&self, name: &str, arguments: &Arguments) -> Risk {
        self.assess_tool_call(name, arguments).risk
    }

    /// Classify a shell command and explain the verdict.
    pub fn assess_command(&self, command: &str) -> Assessment {
        self.with_mode(self.raw_command(command))
    }

    /// Classify a tool call and explain the verdict.
    pub fn assess_tool_call(&self, name: &str, arguments: &Arguments) -> Assessment {
        let raw = match name {
            names::SHELL => match arguments.get("command").and_then(|v| v.as_str()) {
                Some(command) => self.raw_command(command),
                None => Assessment::new(Risk::Confirm, "shell call without a command string"),
            },
            n if names::MUTATING.contains(&n) => {
                Assessment::new(Risk::Confirm, format!("{n} modifies files"))
            }
            n if names::READ_ONLY.contains(&n) => Assessment::new(Risk::Safe, "read-only tool"),
            n => Assessment::new(Risk::Confirm, format!("unrecognized tool '{n}'")),
        };
        self.with_mode(raw)
    }

    fn with_mode(&self, raw: Assessment) -> Assessment {
        let risk = self.apply_mode(raw.risk);
        if risk == raw.risk {
            return raw;
        }
        let reason = match risk {
            Risk::Blocked => format!("{} (not allowed in {} mode)", raw.reason, self.mode),
            _ => format!("{} (auto-approved)", raw.reason),
        };
        Assessment::new(risk, reason)
    }

    fn raw_command(&self, command: &str) -> Assessment {
        if let Some(p) = self.blocked.iter().find(|p| p.regex.is_match(command)) {
            warn!(command, pattern = %p.source, "Command matches blocked pattern");
            return Assessment::new(
                Risk::Blocked,
                format!("matches blocked pattern `{}`", p.source),
            );
        }

        if let Some(p) = self.confirm.iter().find(|p| p.regex.is_match(command)) {
            return Assessment::new(
                Risk::Confirm,
                format!("matches confirm pattern `{}`", p.source),
            );
        }

        if runs_sudo(command) {
            return Assessment::new(Risk::Confirm, "runs with sudo");
        }

        if let Some(path) = self.reserved_write_target(command) {
            return Assessment::new(Risk::Confirm, format!("writes to system path {path}"));
        }

        Assessment::new(Risk::Safe, "no risky pattern found")
    }

    fn reserved_write_target<'a>(&self, command: &'a str) -> Option<&'a str> {
        self.redirect
            .captures_iter(command)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .find(|path| is_reserved(path))
    }
}

fn runs_sudo(command: &str) -> bool {
    command
        .split(['&', ';', '|'])
        .any(|segment| segment.trim_start().starts_with("sudo "))
}

fn is_reserved(path: &str) -> bool {
    if EXEMPT_SINKS.contains(&path) {
        return false;
    }
    RESERVED_PREFIXES.iter().any(|prefix| {
        path.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}
