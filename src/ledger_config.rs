//! Configuration for ledgerbot.
//!
//! Settings are read from `.ledgerbot/ledgerbot.toml` and layered
//! file → environment → CLI. Every field has a default, so an absent or
//! partial file is valid.
//!
//! # Configuration File Format
//!
//! ```toml
//! [database]
//! path = ".ledgerbot/ledger.db"
//!
//! [limits]
//! max_amount = "1000000"
//! description_min = 3
//! description_max = 100
//! edit_description_max = 200
//! name_min = 2
//! name_max = 50
//!
//! [flow]
//! draft_ttl_minutes = 60
//! on_new_flow = "replace"
//!
//! [folio]
//! tenant_prefix = "F-"
//! personal_prefix = "P-"
//! tenant_width = 4
//! personal_width = 6
//! max_attempts = 3
//!
//! [access]
//! super_admins = [1001]
//!
//! [logging]
//! level = "info"
//! json = false
//! directory = ".ledgerbot/logs"
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ledgerbot_common::UserId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Environment variable overriding `[database].path`.
pub const DB_ENV: &str = "LEDGERBOT_DB";
/// Comma-separated user ids merged into `[access].super_admins`.
pub const SUPER_ADMINS_ENV: &str = "LEDGERBOT_SUPER_ADMINS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".ledgerbot/ledger.db")
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Input bounds enforced by the dialog steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsSection {
    /// Largest accepted amount (inclusive)
    #[serde(default = "default_max_amount")]
    pub max_amount: Decimal,
    #[serde(default = "default_description_min")]
    pub description_min: usize,
    #[serde(default = "default_description_max")]
    pub description_max: usize,
    /// Upper bound when editing an existing movement's description
    #[serde(default = "default_edit_description_max")]
    pub edit_description_max: usize,
    /// Bounds for category, person and company names
    #[serde(default = "default_name_min")]
    pub name_min: usize,
    #[serde(default = "default_name_max")]
    pub name_max: usize,
}

fn default_max_amount() -> Decimal {
    Decimal::new(1_000_000, 0)
}

fn default_description_min() -> usize {
    3
}

fn default_description_max() -> usize {
    100
}

fn default_edit_description_max() -> usize {
    200
}

fn default_name_min() -> usize {
    2
}

fn default_name_max() -> usize {
    50
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_amount: default_max_amount(),
            description_min: default_description_min(),
            description_max: default_description_max(),
            edit_description_max: default_edit_description_max(),
            name_min: default_name_min(),
            name_max: default_name_max(),
        }
    }
}

/// What happens when a flow starts while another draft is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewFlowPolicy {
    /// Discard the existing draft and start the new flow.
    #[default]
    Replace,
    /// Keep the existing draft and refuse the new flow.
    Reject,
}

impl std::fmt::Display for NewFlowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NewFlowPolicy::Replace => write!(f, "replace"),
            NewFlowPolicy::Reject => write!(f, "reject"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSection {
    /// Minutes of inactivity after which a draft is discarded; 0 disables
    #[serde(default = "default_draft_ttl_minutes")]
    pub draft_ttl_minutes: u32,
    #[serde(default)]
    pub on_new_flow: NewFlowPolicy,
}

fn default_draft_ttl_minutes() -> u32 {
    60
}

impl Default for FlowSection {
    fn default() -> Self {
        Self {
            draft_ttl_minutes: default_draft_ttl_minutes(),
            on_new_flow: NewFlowPolicy::default(),
        }
    }
}

impl FlowSection {
    pub fn draft_ttl(&self) -> Option<chrono::Duration> {
        (self.draft_ttl_minutes > 0).then(|| chrono::Duration::minutes(self.draft_ttl_minutes.into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolioSection {
    #[serde(default = "default_tenant_prefix")]
    pub tenant_prefix: String,
    #[serde(default = "default_personal_prefix")]
    pub personal_prefix: String,
    #[serde(default = "default_tenant_width")]
    pub tenant_width: usize,
    #[serde(default = "default_personal_width")]
    pub personal_width: usize,
    /// Allocation attempts before a conflicting folio is reported as failure
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_tenant_prefix() -> String {
    "F-".to_string()
}

fn default_personal_prefix() -> String {
    "P-".to_string()
}

fn default_tenant_width() -> usize {
    4
}

fn default_personal_width() -> usize {
    6
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for FolioSection {
    fn default() -> Self {
        Self {
            tenant_prefix: default_tenant_prefix(),
            personal_prefix: default_personal_prefix(),
            tenant_width: default_tenant_width(),
            personal_width: default_personal_width(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessSection {
    /// System-wide super-admins, independent of tenant membership
    #[serde(default)]
    pub super_admins: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// When set, logs are also written to a daily-rolling file here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            directory: None,
        }
    }
}

/// The complete ledgerbot.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerToml {
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub flow: FlowSection,
    #[serde(default)]
    pub folio: FolioSection,
    #[serde(default)]
    pub access: AccessSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl LedgerToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse ledgerbot.toml")
    }

    /// Load `ledgerbot.toml` from `ledger_dir`, or defaults if it is absent.
    pub fn load_or_default(ledger_dir: &Path) -> Result<Self> {
        let config_path = ledger_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize ledgerbot.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Problems that would make the engines misbehave. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let limits = &self.limits;
        if limits.max_amount <= Decimal::ZERO {
            problems.push("limits.max_amount must be greater than zero".to_string());
        }
        if limits.description_min == 0 || limits.description_min > limits.description_max {
            problems.push(format!(
                "limits.description_min ({}) must be between 1 and description_max ({})",
                limits.description_min, limits.description_max
            ));
        }
        if limits.edit_description_max < limits.description_min {
            problems.push(format!(
                "limits.edit_description_max ({}) is below description_min ({})",
                limits.edit_description_max, limits.description_min
            ));
        }
        if limits.name_min == 0 || limits.name_min > limits.name_max {
            problems.push(format!(
                "limits.name_min ({}) must be between 1 and name_max ({})",
                limits.name_min, limits.name_max
            ));
        }
        for (name, width) in [
            ("tenant_width", self.folio.tenant_width),
            ("personal_width", self.folio.personal_width),
        ] {
            if !(1..=12).contains(&width) {
                problems.push(format!("folio.{} ({}) must be between 1 and 12", name, width));
            }
        }
        if self.folio.tenant_prefix == self.folio.personal_prefix {
            problems.push(format!(
                "folio.tenant_prefix and folio.personal_prefix are both '{}'; the series would overlap",
                self.folio.tenant_prefix
            ));
        }
        for (name, prefix) in [
            ("tenant_prefix", &self.folio.tenant_prefix),
            ("personal_prefix", &self.folio.personal_prefix),
        ] {
            if prefix.chars().any(|c| c.is_ascii_digit()) {
                problems.push(format!("folio.{} '{}' must not contain digits", name, prefix));
            }
        }
        if self.folio.max_attempts == 0 {
            problems.push("folio.max_attempts must be at least 1".to_string());
        }
        problems
    }
}

/// Name of the per-project data directory.
pub const LEDGER_DIR: &str = ".ledgerbot";
/// Name of the configuration file inside [`LEDGER_DIR`].
pub const CONFIG_FILE: &str = "ledgerbot.toml";

/// Resolved runtime configuration.
///
/// Wraps the parsed file and applies environment overrides on access.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub project_dir: PathBuf,
    pub toml: LedgerToml,
}

impl LedgerConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let toml = LedgerToml::load_or_default(&project_dir.join(LEDGER_DIR))?;
        Ok(Self { project_dir, toml })
    }

    pub fn ledger_dir(&self) -> PathBuf {
        self.project_dir.join(LEDGER_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.ledger_dir().join(CONFIG_FILE)
    }

    /// Database path, with fallback to environment variable. Relative paths
    /// resolve against the project directory.
    pub fn db_path(&self) -> PathBuf {
        let path = std::env::var(DB_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| self.toml.database.path.clone());
        if path.is_absolute() {
            path
        } else {
            self.project_dir.join(path)
        }
    }

    /// Configured super-admins merged with the environment list.
    pub fn super_admins(&self) -> BTreeSet<UserId> {
        let mut ids: BTreeSet<UserId> =
            self.toml.access.super_admins.iter().copied().map(UserId).collect();
        if let Ok(list) = std::env::var(SUPER_ADMINS_ENV) {
            ids.extend(parse_id_list(&list));
        }
        ids
    }

    pub fn log_directory(&self) -> Option<PathBuf> {
        self.toml.logging.directory.as_ref().map(|dir| {
            if dir.is_absolute() {
                dir.clone()
            } else {
                self.project_dir.join(dir)
            }
        })
    }
}

fn parse_id_list(list: &str) -> impl Iterator<Item = UserId> + '_ {
    list.split(',').filter_map(|part| part.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_yields_defaults() {
        let toml = LedgerToml::parse("").unwrap();
        assert_eq!(toml.limits, LimitsSection::default());
        assert_eq!(toml.limits.description_max, 100);
        assert_eq!(toml.flow.on_new_flow, NewFlowPolicy::Replace);
        assert_eq!(toml.folio.tenant_width, 4);
        assert_eq!(toml.folio.personal_width, 6);
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let toml = LedgerToml::parse(
            r#"
            [limits]
            max_amount = "250.50"

            [flow]
            on_new_flow = "reject"
            draft_ttl_minutes = 0

            [access]
            super_admins = [7, 9]
            "#,
        )
        .unwrap();
        assert_eq!(toml.limits.max_amount, Decimal::new(25050, 2));
        assert_eq!(toml.limits.description_min, 3);
        assert_eq!(toml.flow.on_new_flow, NewFlowPolicy::Reject);
        assert!(toml.flow.draft_ttl().is_none());
        assert_eq!(toml.access.super_admins, vec![7, 9]);
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        assert!(LedgerToml::parse("[flow]\non_new_flow = \"merge\"").is_err());
    }

    #[test]
    fn test_validate_reports_each_problem() {
        let mut toml = LedgerToml::default();
        toml.limits.description_min = 150;
        toml.folio.personal_prefix = toml.folio.tenant_prefix.clone();
        toml.folio.tenant_width = 0;
        toml.folio.max_attempts = 0;
        let problems = toml.validate();
        assert_eq!(problems.len(), 4, "{problems:?}");
        assert!(problems.iter().any(|p| p.contains("description_min")));
        assert!(problems.iter().any(|p| p.contains("overlap")));
        assert!(problems.iter().any(|p| p.contains("tenant_width")));
        assert!(problems.iter().any(|p| p.contains("max_attempts")));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut toml = LedgerToml::default();
        toml.access.super_admins = vec![1];
        toml.logging.json = true;
        toml.save(&path).unwrap();

        let loaded = LedgerToml::load(&path).unwrap();
        assert_eq!(loaded.access.super_admins, vec![1]);
        assert!(loaded.logging.json);
    }

    #[test]
    fn test_config_resolves_relative_db_path() {
        let dir = TempDir::new().unwrap();
        let config = LedgerConfig::new(dir.path().to_path_buf()).unwrap();
        if std::env::var(DB_ENV).is_err() {
            assert_eq!(config.db_path(), dir.path().join(".ledgerbot/ledger.db"));
        }
    }

    #[test]
    fn test_parse_id_list_skips_garbage() {
        let ids: Vec<UserId> = parse_id_list(" 4, x,12 ,").collect();
        assert_eq!(ids, vec![UserId(4), UserId(12)]);
    }
}
