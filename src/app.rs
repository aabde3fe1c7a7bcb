//! Wiring of the engines over one SQLite database.

use std::sync::Arc;

use anyhow::{Context, Result};
use ledgerbot_common::{Actor, Directory, UserId};

use crate::auth::AuthorizationEngine;
use crate::clock::SystemClock;
use crate::flow::{FlowEngine, FlowSettings};
use crate::ledger_config::LedgerConfig;
use crate::sequence::{FolioFormat, SequenceGenerator};
use crate::store::DbHandle;

pub struct App {
    pub config: LedgerConfig,
    pub db: Arc<DbHandle>,
    pub auth: Arc<AuthorizationEngine>,
}

impl App {
    /// Open the configured database, creating its parent directory.
    pub fn open(config: LedgerConfig) -> Result<Self> {
        let db_path = config.db_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let db = Arc::new(DbHandle::open(&db_path)?);
        Ok(Self::with_handle(config, db))
    }

    pub fn with_handle(config: LedgerConfig, db: Arc<DbHandle>) -> Self {
        let auth = Arc::new(AuthorizationEngine::new(db.clone(), config.super_admins()));
        Self { config, db, auth }
    }

    pub fn engine(&self) -> FlowEngine {
        let toml = &self.config.toml;
        let sequence = SequenceGenerator::new(
            self.db.clone(),
            FolioFormat::from(&toml.folio),
            toml.folio.max_attempts,
        );
        FlowEngine::new(
            self.db.clone(),
            self.db.clone(),
            self.db.clone(),
            self.auth.clone(),
            Arc::new(sequence),
            Arc::new(SystemClock),
            FlowSettings::from(toml),
        )
    }

    /// Look up a registered user.
    pub async fn actor(&self, id: UserId) -> Result<Actor> {
        self.db
            .find_actor(id)
            .await?
            .with_context(|| format!("User {} is not registered; add it with `ledgerbot user add`", id))
    }
}
