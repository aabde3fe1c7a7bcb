//! Integration tests for the ledgerbot CLI
//!
//! Each test runs the binary against a fresh temporary project.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a ledgerbot Command with a clean environment
fn ledgerbot() -> Command {
    let mut cmd = cargo_bin_cmd!("ledgerbot");
    cmd.env_remove("LEDGERBOT_DB")
        .env_remove("LEDGERBOT_SUPER_ADMINS")
        .env_remove("RUST_LOG");
    cmd
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

/// Initialized project with one company and an operator and admin in it
fn seeded_project() -> TempDir {
    let dir = create_temp_project();
    ledgerbot()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
    ledgerbot()
        .current_dir(dir.path())
        .args(["tenant", "add", "acme", "Acme Corp"])
        .assert()
        .success();
    ledgerbot()
        .current_dir(dir.path())
        .args(["user", "add", "7", "Pat", "--role", "OPERATOR", "--home", "acme"])
        .assert()
        .success();
    ledgerbot()
        .current_dir(dir.path())
        .args(["user", "add", "8", "Ada", "--role", "ADMIN", "--home", "acme"])
        .assert()
        .success();
    dir
}

fn chat(dir: &TempDir, user: &str, script: &str) -> assert_cmd::assert::Assert {
    ledgerbot()
        .current_dir(dir.path())
        .args(["chat", "--user", user])
        .write_stdin(script)
        .assert()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        ledgerbot()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("chat"));
    }

    #[test]
    fn test_version() {
        ledgerbot().arg("--version").assert().success();
    }

    #[test]
    fn test_init_creates_structure() {
        let dir = create_temp_project();

        ledgerbot()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized ledgerbot project"));

        assert!(dir.path().join(".ledgerbot/ledgerbot.toml").exists());
        assert!(dir.path().join(".ledgerbot/ledger.db").exists());
        assert!(dir.path().join(".ledgerbot/logs").is_dir());
    }

    #[test]
    fn test_init_idempotent() {
        let dir = create_temp_project();
        ledgerbot()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success();
        ledgerbot()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("already initialized"));
    }

    #[test]
    fn test_invalid_role_is_rejected() {
        let dir = create_temp_project();
        ledgerbot()
            .current_dir(dir.path())
            .args(["user", "add", "1", "Bob", "--role", "MANAGER"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid role"));
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod configuration {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = create_temp_project();
        ledgerbot()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No ledgerbot.toml found"))
            .stdout(predicate::str::contains("on_new_flow = \"replace\""));
    }

    #[test]
    fn test_config_init_creates_toml() {
        let dir = create_temp_project();
        ledgerbot()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created ledgerbot.toml"));

        let content = fs::read_to_string(dir.path().join(".ledgerbot/ledgerbot.toml")).unwrap();
        assert!(content.contains("[limits]"));
        assert!(content.contains("[folio]"));
    }

    #[test]
    fn test_config_validate_no_config() {
        let dir = create_temp_project();
        ledgerbot()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Using defaults (valid)"));
    }

    #[test]
    fn test_config_validate_reports_problems() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".ledgerbot")).unwrap();
        fs::write(
            dir.path().join(".ledgerbot/ledgerbot.toml"),
            "[limits]\ndescription_min = 500\n\n[folio]\nmax_attempts = 0\n",
        )
        .unwrap();

        ledgerbot()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("description_min"))
            .stdout(predicate::str::contains("max_attempts"));
    }

    #[test]
    fn test_super_admins_from_env_are_shown() {
        let dir = create_temp_project();
        ledgerbot()
            .current_dir(dir.path())
            .env("LEDGERBOT_SUPER_ADMINS", "42, 43")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("super_admins = [42, 43]"));
    }
}

// =============================================================================
// Identity seeding
// =============================================================================

mod admin {
    use super::*;

    #[test]
    fn test_tenant_add_and_list() {
        let dir = seeded_project();
        ledgerbot()
            .current_dir(dir.path())
            .args(["tenant", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("acme"))
            .stdout(predicate::str::contains("Acme Corp"));
    }

    #[test]
    fn test_duplicate_user_fails() {
        let dir = seeded_project();
        ledgerbot()
            .current_dir(dir.path())
            .args(["user", "add", "7", "Pat", "--role", "OPERATOR"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to add user 7"));
    }

    #[test]
    fn test_grant_unknown_user_fails() {
        let dir = seeded_project();
        ledgerbot()
            .current_dir(dir.path())
            .args(["grant", "99", "acme", "--view"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not registered"));
    }

    #[test]
    fn test_grant_without_flags_uses_role_template() {
        let dir = seeded_project();
        ledgerbot()
            .current_dir(dir.path())
            .args(["grant", "8", "acme"])
            .assert()
            .success()
            .stdout(predicate::str::contains("view=true"));
    }
}

// =============================================================================
// Chat and reports
// =============================================================================

mod chat {
    use super::*;

    #[test]
    fn test_operator_registers_company_expense() {
        let dir = seeded_project();
        chat(
            &dir,
            "7",
            "/expense\n!type:company\n150.50\nOffice paper\n!category:none\n!skip\n!date:0\n!confirm\n",
        )
        .success()
        .stdout(predicate::str::contains("Saved expense F-"))
        .stdout(predicate::str::contains("for 150.50"));
    }

    #[test]
    fn test_invalid_amount_is_asked_again() {
        let dir = seeded_project();
        chat(&dir, "7", "/expense\n!type:personal\nabc\n")
            .success()
            .stdout(predicate::str::contains("✗"));
    }

    #[test]
    fn test_draft_survives_between_sessions() {
        let dir = seeded_project();
        chat(&dir, "7", "/income\n!type:personal\n99\n").success();
        chat(&dir, "7", "Consulting fee\n!category:none\n!skip\n!date:1\n!confirm\n")
            .success()
            .stdout(predicate::str::contains("Saved income P-"));
    }

    #[test]
    fn test_operator_cannot_add_users() {
        let dir = seeded_project();
        chat(&dir, "7", "/adduser\n")
            .success()
            .stdout(predicate::str::contains("cannot assign roles"));
    }

    #[test]
    fn test_unknown_user_cannot_chat() {
        let dir = seeded_project();
        chat(&dir, "404", "hello\n")
            .failure()
            .stderr(predicate::str::contains("not registered"));
    }

    #[test]
    fn test_operator_report_is_own_scope() {
        let dir = seeded_project();
        chat(
            &dir,
            "7",
            "/expense\n!type:personal\n12\nCoffee beans\n!category:none\n!skip\n!date:0\n!confirm\n",
        )
        .success();

        ledgerbot()
            .current_dir(dir.path())
            .args(["report", "--user", "7"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Report scope: OWN"))
            .stdout(predicate::str::contains("Coffee beans"));
    }

    #[test]
    fn test_report_rejects_bad_month() {
        let dir = seeded_project();
        ledgerbot()
            .current_dir(dir.path())
            .args(["report", "--user", "7", "--month", "2024-13"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid --month"));
    }
}
