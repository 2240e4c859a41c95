//! `clawshell config`: configuration management commands.

use std::path::Path;

use clawshell_config::AppConfig;
use clawshell_security::SafetyClassifier;

pub fn validate(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating {}", path.display());

    let config = match AppConfig::load_from(path) {
        Ok(config) => config,
        Err(e) => {
            println!("   ERROR: {e}");
            return Err(e.into());
        }
    };
    println!("   OK  config parsed");

    // The safety lists are only compiled when the agent starts; catch bad
    // regexes here instead.
    if let Err(e) = SafetyClassifier::new(&config.safety) {
        println!("   ERROR: {e}");
        return Err(e.into());
    }
    println!("   OK  safety patterns compile");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   OK  all checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   WARN {w}");
        }
    }

    println!();
    println!("   Provider:  {} ({})", config.provider.name, config.provider.base_url);
    println!("   Model:     {}", config.provider.model);
    println!("   Safety:    {}", config.safety.mode);
    println!("   Steps:     {}", config.agent.max_steps);
    println!("   Context:   {} tokens", config.context.token_budget);
    println!("   Backups:   {}", config.backup_dir().display());
    Ok(())
}

/// Non-fatal problems worth pointing out.
fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push("No API key set (set CLAWSHELL_API_KEY or OPENAI_API_KEY)");
    }
    if config.safety.blocked_patterns.is_empty() {
        warnings.push("No blocked patterns: destructive commands are only gated by confirmation");
    }
    if config.safety.mode == clawshell_config::SafetyMode::AutoApprove {
        warnings.push("auto_approve mode runs risky commands without asking");
    }
    warnings
}

/// Print the effective configuration with the API key masked.
pub fn show(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load(path)?;
    println!("{}", render_redacted(&config)?);
    Ok(())
}

fn render_redacted(config: &AppConfig) -> Result<String, toml::ser::Error> {
    let mut config = config.clone();
    if config.provider.api_key.is_some() {
        config.provider.api_key = Some("***".into());
    }
    toml::to_string_pretty(&config)
}

pub fn path(path: &Path) {
    println!("{}", path.display());
}

/// Write the default configuration unless a file already exists.
pub fn init(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
