//! `clawshell doctor`: diagnose setup problems.

use std::path::Path;

use clawshell_config::AppConfig;
use clawshell_core::provider::Provider;
use clawshell_providers::OpenAiCompatProvider;

pub async fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("clawshell doctor");
    println!("================\n");

    let mut issues = 0;

    if path.exists() {
        println!("  OK    config file at {}", path.display());
    } else {
        println!("  WARN  no config file, using defaults (run `clawshell config init`)");
    }

    let config = match AppConfig::load_from(path) {
        Ok(config) => {
            println!("  OK    config valid");
            config
        }
        Err(e) => {
            println!("  FAIL  config invalid: {e}");
            println!("\n  1 issue found. See above for details.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  OK    API key configured");
    } else {
        println!("  WARN  no API key configured");
        issues += 1;
    }

    match OpenAiCompatProvider::from_config(&config.provider) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  OK    {} reachable", provider.base_url()),
            Ok(false) => {
                println!("  FAIL  {} answered but is not healthy", provider.base_url());
                issues += 1;
            }
            Err(e) => {
                println!("  FAIL  {}: {e}", provider.base_url());
                issues += 1;
            }
        },
        Err(e) => {
            println!("  FAIL  provider setup: {e}");
            issues += 1;
        }
    }

    let backups = config.backup_dir();
    if backups.exists() {
        println!("  OK    backup directory {}", backups.display());
    } else {
        println!("  INFO  backup directory {} will be created on first write", backups.display());
    }

    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
