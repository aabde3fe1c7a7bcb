use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ledgerbot::ledger_config::LedgerConfig;
use ledgerbot::logging::{self, LoggingOptions};
use ledgerbot_common::Role;
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "ledgerbot")]
#[command(version, about = "Chat-driven expense and income tracker")]
pub struct Cli {
    /// Log at debug level (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create .ledgerbot/ with a default config and database
    Init,
    /// Register or list companies
    Tenant {
        #[command(subcommand)]
        command: TenantCommands,
    },
    /// Register users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Set a user's permissions in a company
    Grant {
        user: i64,
        tenant: String,
        #[arg(long)]
        view: bool,
        #[arg(long)]
        edit: bool,
        #[arg(long)]
        report: bool,
        #[arg(long)]
        manage_users: bool,
    },
    /// Chat with the assistant on the console
    Chat {
        /// Chat user id to act as
        #[arg(long)]
        user: i64,
        /// Conversation id (defaults to console:<user>)
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Print the movements a user may report on
    Report {
        #[arg(long)]
        user: i64,
        /// Restrict to one month, e.g. 2024-08
        #[arg(long)]
        month: Option<String>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum TenantCommands {
    Add {
        id: String,
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    List,
}

#[derive(Subcommand, Clone)]
pub enum UserCommands {
    Add {
        id: i64,
        name: String,
        #[arg(long)]
        role: Role,
        /// Home company; its grant is created from the role template on first use
        #[arg(long)]
        home: Option<String>,
        #[arg(long)]
        super_admin: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any problems
    Validate,
    /// Initialize a default ledgerbot.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = LedgerConfig::new(project_dir.clone())?;
    let mut options = LoggingOptions::from_section(&config.toml.logging, config.log_directory());
    if cli.verbose {
        options.level = "debug".to_string();
    }
    let _guard = logging::init(&options)?;

    match cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Tenant { command } => cmd::cmd_tenant(config, command).await?,
        Commands::User { command } => cmd::cmd_user(config, command).await?,
        Commands::Grant {
            user,
            tenant,
            view,
            edit,
            report,
            manage_users,
        } => {
            let flags = [view, edit, report, manage_users];
            cmd::cmd_grant(config, user, &tenant, flags).await?
        }
        Commands::Chat { user, conversation } => {
            cmd::cmd_chat(config, user, conversation).await?
        }
        Commands::Report { user, month } => {
            cmd::cmd_report(config, user, month.as_deref()).await?
        }
        Commands::Config { command } => cmd::cmd_config(&config, command)?,
    }

    Ok(())
}
