//! clawshell CLI: the main entry point.
//!
//! Commands:
//! - `agent`   : interactive chat or single-message mode
//! - `config`  : show, validate, locate or initialize the config file
//! - `doctor`  : check config, backend reachability and backup directory

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clawshell_config::{AppConfig, SafetyMode};

mod commands;

#[derive(Parser)]
#[command(
    name = "clawshell",
    about = "clawshell: operate your machine through an LLM",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.clawshell/config.toml
    #[arg(short, long, global = true, env = "CLAWSHELL_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Agent {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Override the safety mode (read_only, supervised, auto_approve)
        #[arg(long)]
        mode: Option<SafetyMode>,

        /// Override the model
        #[arg(long)]
        model: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Diagnose setup problems
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (API key redacted)
    Show,
    /// Check the configuration for errors
    Validate,
    /// Print the config file path
    Path,
    /// Write a default config file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli
        .config
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));

    match cli.command {
        Commands::Agent {
            message,
            mode,
            model,
        } => {
            let mut config = commands::load(&config_path)?;
            if let Some(mode) = mode {
                config.safety.mode = mode;
            }
            if let Some(model) = model {
                config.provider.model = model;
            }
            commands::agent::run(config, message).await?
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(&config_path)?,
            ConfigAction::Validate => commands::config_cmd::validate(&config_path)?,
            ConfigAction::Path => commands::config_cmd::path(&config_path),
            ConfigAction::Init => commands::config_cmd::init(&config_path)?,
        },
        Commands::Doctor => commands::doctor::run(&config_path).await?,
    }

    Ok(())
}
