//! Configuration view and validation commands: `ledgerbot config`.

use anyhow::Result;
use ledgerbot::ledger_config::{LedgerConfig, LedgerToml};

use super::super::ConfigCommands;

pub fn cmd_config(config: &LedgerConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_path();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Ledgerbot Configuration");
            println!("=======================");
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No ledgerbot.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();
            print!("{}", toml::to_string_pretty(&config.toml)?);
            println!();

            println!("Effective values (with env overrides):");
            println!("  database = \"{}\"", config.db_path().display());
            let admins: Vec<String> = config
                .super_admins()
                .iter()
                .map(|id| id.to_string())
                .collect();
            println!("  super_admins = [{}]", admins.join(", "));
            match config.log_directory() {
                Some(dir) => println!("  log_directory = \"{}\"", dir.display()),
                None => println!("  log_directory = (console only)"),
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No ledgerbot.toml found. Using defaults (valid).");
                return Ok(());
            }

            let problems = LedgerToml::load(&config_path)?.validate();
            if problems.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration problems:");
                for problem in &problems {
                    println!("  - {}", problem);
                }
                anyhow::bail!("{} configuration problem(s)", problems.len());
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("ledgerbot.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(config.ledger_dir())?;
            LedgerToml::default().save(&config_path)?;

            println!("Created ledgerbot.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [limits] amount and text bounds");
            println!("  - [flow] draft_ttl_minutes, on_new_flow");
            println!("  - [folio] prefixes, widths and retry attempts");
            println!("  - [access] super_admins");
            println!();
        }
    }

    Ok(())
}
