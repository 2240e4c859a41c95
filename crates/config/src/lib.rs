//! Configuration loading, validation, and management for clawshell.
//!
//! Loads configuration from `~/.clawshell/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The root configuration structure.
///
/// Maps directly to `~/.clawshell/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Completion backend settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Transcript budget settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Risk classification settings
    #[serde(default)]
    pub safety: SafetyConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("agent", &self.agent)
            .field("context", &self.context)
            .field("safety", &self.safety)
            .field("tools", &self.tools)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Display name of the backend
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// Base URL of an OpenAI-compatible `/chat/completions` endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model to request
    #[serde(default = "default_model")]
    pub model: String,

    /// API key (environment variables take over when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// HTTP request timeout
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

fn default_provider_name() -> String {
    "openai".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_request_timeout() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_request_timeout(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Maximum inference calls per user turn
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Replace the built-in system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_steps() -> u32 {
    15
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    4096
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Estimated tokens the transcript may occupy before trimming
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Headroom kept free for the summary note when trimming
    #[serde(default = "default_summary_reserve")]
    pub summary_reserve_tokens: usize,
}

fn default_token_budget() -> usize {
    24_000
}
fn default_summary_reserve() -> usize {
    200
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            summary_reserve_tokens: default_summary_reserve(),
        }
    }
}

/// How classification results are adjusted before the loop acts on them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyMode {
    /// Anything that needs confirmation is blocked
    ReadOnly,
    /// Ask the operator before risky actions (default)
    #[default]
    Supervised,
    /// Run risky actions without asking; blocked actions stay blocked
    AutoApprove,
}

impl FromStr for SafetyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "read_only" | "readonly" => Ok(Self::ReadOnly),
            "supervised" | "default" => Ok(Self::Supervised),
            "auto_approve" | "auto" | "yolo" => Ok(Self::AutoApprove),
            other => Err(ConfigError::ValidationError(format!(
                "unknown safety mode '{other}' (expected read_only, supervised or auto_approve)"
            ))),
        }
    }
}

impl std::fmt::Display for SafetyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ReadOnly => "read_only",
            Self::Supervised => "supervised",
            Self::AutoApprove => "auto_approve",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default)]
    pub mode: SafetyMode,

    /// Regexes that veto a shell command outright. Evaluated first, in order.
    #[serde(default = "default_blocked_patterns")]
    pub blocked_patterns: Vec<String>,

    /// Regexes that require operator confirmation. Evaluated in order.
    #[serde(default = "default_confirm_patterns")]
    pub confirm_patterns: Vec<String>,
}

pub fn default_blocked_patterns() -> Vec<String> {
    [
        // rm -rf of the root, a top-level glob, or the home directory
        r"\brm\s+(-\S+\s+)*(/|/\*|~|~/|\$HOME)(\s|$)",
        r"\bmkfs(\.\w+)?\b",
        r"\bdd\b.*\bof=/dev/(sd|nvme|hd|disk|mmcblk)",
        r">\s*/dev/(sd|nvme|hd|disk|mmcblk)",
        r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
        r"\bchmod\s+(-R\s+)?0?777\s+/(\s|$)",
        r"\b(shutdown|halt|poweroff)\b",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

pub fn default_confirm_patterns() -> Vec<String> {
    [
        r"\brm\s",
        r"\brmdir\s",
        r"\bmv\s",
        r"\bchmod\s",
        r"\bchown\s",
        r"\bgit\s+(push|reset|rebase|clean|checkout\s+--)",
        r"\b(kill|pkill|killall)\b",
        r"\breboot\b",
        r"\b(apt|apt-get|yum|dnf|pacman|brew|pip3?|npm|cargo)\s+(install|remove|uninstall|purge)\b",
        r"\b(curl|wget)\b.*\|\s*(ba|z)?sh\b",
        r"\bsystemctl\s+(stop|restart|disable|mask)\b",
        r"\btruncate\s",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            mode: SafetyMode::default(),
            blocked_patterns: default_blocked_patterns(),
            confirm_patterns: default_confirm_patterns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Default shell command timeout
    #[serde(default = "default_shell_timeout")]
    pub shell_timeout_secs: u64,

    /// Output longer than this is cut and flagged as truncated
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,

    /// Where file backups go before overwrites (defaults under the config dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
}

fn default_shell_timeout() -> u64 {
    60
}
fn default_max_output_chars() -> usize {
    30_000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell_timeout_secs: default_shell_timeout(),
            max_output_chars: default_max_output_chars(),
            backup_dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.clawshell/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific file path, then apply environment
    /// overrides:
    /// - `CLAWSHELL_API_KEY`, then `OPENAI_API_KEY` (only if no key is configured)
    /// - `CLAWSHELL_MODEL`
    /// - `CLAWSHELL_BASE_URL`
    /// - `CLAWSHELL_SAFETY_MODE`
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if self.provider.api_key.is_none() {
            self.provider.api_key = var("CLAWSHELL_API_KEY").or_else(|| var("OPENAI_API_KEY"));
        }
        if let Some(model) = var("CLAWSHELL_MODEL") {
            self.provider.model = model;
        }
        if let Some(url) = var("CLAWSHELL_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(mode) = var("CLAWSHELL_SAFETY_MODE") {
            self.safety.mode = mode.parse()?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".clawshell")
    }

    /// Where file backups are written.
    pub fn backup_dir(&self) -> PathBuf {
        self.tools
            .backup_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("backups"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_steps must be at least 1".into(),
            ));
        }

        if self.context.token_budget <= self.context.summary_reserve_tokens {
            return Err(ConfigError::ValidationError(
                "context.token_budget must exceed context.summary_reserve_tokens".into(),
            ));
        }

        if let Some(empty) = self
            .safety
            .blocked_patterns
            .iter()
            .chain(&self.safety.confirm_patterns)
            .find(|p| p.trim().is_empty())
        {
            return Err(ConfigError::ValidationError(format!(
                "safety patterns must not be empty (got {empty:?})"
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
