//! `ledgerbot init`: create the `.ledgerbot/` directory in a project.
//!
//! ```text
//! .ledgerbot/
//! ├── ledgerbot.toml   # Configuration (defaults written on first init)
//! ├── ledger.db        # SQLite database (default location)
//! └── logs/            # Daily-rolling log files when enabled
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::ledger_config::{CONFIG_FILE, LEDGER_DIR, LedgerConfig, LedgerToml};
use crate::store::Database;

/// Result of initializing a ledgerbot project.
#[derive(Debug)]
pub struct InitResult {
    pub ledger_dir: PathBuf,
    /// False if the directory already existed
    pub created: bool,
    pub db_path: PathBuf,
}

/// Initialize a ledgerbot project in the given directory.
///
/// Existing files are kept; only missing pieces are created. The database
/// is opened once so its schema exists before the first chat.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let ledger_dir = get_ledger_dir(project_dir);
    let created = !ledger_dir.exists();

    std::fs::create_dir_all(ledger_dir.join("logs"))
        .with_context(|| format!("Failed to create directory: {}", ledger_dir.display()))?;

    let config_path = ledger_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        LedgerToml::default().save(&config_path)?;
    }

    let config = LedgerConfig::new(project_dir.to_path_buf())?;
    let db_path = config.db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Database::new(&db_path)?;

    Ok(InitResult {
        ledger_dir,
        created,
        db_path,
    })
}

pub fn is_initialized(project_dir: &Path) -> bool {
    get_ledger_dir(project_dir).exists()
}

pub fn get_ledger_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(LEDGER_DIR)
}
