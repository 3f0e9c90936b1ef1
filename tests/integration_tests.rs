//! Integration tests for the rmw-board CLI
//!
//! These tests run the binary without a server: argument parsing,
//! configuration, and the validation and confirmation paths that must fail
//! or stop before any network call.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Nothing listens on the discard port.
const DEAD_SERVER: &str = "http://127.0.0.1:9";

/// Helper to create an rmw-board Command isolated from the caller's env
fn board(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("rmw-board");
    cmd.current_dir(dir.path())
        .env_remove("RMW_SERVER_URL")
        .env_remove("RMW_PORT")
        .env_remove("RMW_DB_PATH")
        .env_remove("RMW_LOG_FORMAT")
        .env_remove("RMW_USER")
        .env_remove("RUST_LOG");
    cmd
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help_lists_commands() {
        let dir = create_temp_project();
        board(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("submit"))
            .stdout(predicate::str::contains("batch-complete"))
            .stdout(predicate::str::contains("report"));
    }

    #[test]
    fn test_version() {
        let dir = create_temp_project();
        board(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_unknown_status_is_rejected_by_parser() {
        let dir = create_temp_project();
        board(&dir)
            .args(["status", "6f1c7d0e-2b44-4a8e-9c3e-0d6a1f1b2c3d", "done"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid status: done"));
    }

    #[test]
    fn test_malformed_id_is_rejected_by_parser() {
        let dir = create_temp_project();
        board(&dir)
            .args(["delete", "not-a-uuid"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid value"));
    }

    #[test]
    fn test_unknown_role_is_rejected_by_parser() {
        let dir = create_temp_project();
        board(&dir)
            .args(["role", "set", "u-1", "guest"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid role: guest"));
    }

    #[test]
    fn test_batch_complete_requires_ids() {
        let dir = create_temp_project();
        board(&dir).arg("batch-complete").assert().failure();
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_init_writes_defaults() {
        let dir = create_temp_project();
        board(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created board.toml"));

        let content = fs::read_to_string(dir.path().join(".rmw/board.toml")).unwrap();
        assert!(content.contains("port = 3142"));
        assert!(content.contains("department = \"RMW\""));
    }

    #[test]
    fn test_config_init_does_not_overwrite() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".rmw")).unwrap();
        fs::write(dir.path().join(".rmw/board.toml"), "[server]\nport = 4000\n").unwrap();

        board(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));

        let content = fs::read_to_string(dir.path().join(".rmw/board.toml")).unwrap();
        assert_eq!(content, "[server]\nport = 4000\n");
    }

    #[test]
    fn test_config_show_applies_env_and_flags() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".rmw")).unwrap();
        fs::write(dir.path().join(".rmw/board.toml"), "[server]\nport = 4000\n").unwrap();

        board(&dir)
            .env("RMW_DB_PATH", "/tmp/elsewhere.db")
            .args(["--server", "http://board.local:7000", "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("port = 4000"))
            .stdout(predicate::str::contains("/tmp/elsewhere.db"))
            .stdout(predicate::str::contains("http://board.local:7000"));
    }

    #[test]
    fn test_dotenv_is_loaded() {
        let dir = create_temp_project();
        fs::write(dir.path().join(".env"), "RMW_PORT=5055\n").unwrap();

        board(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("port = 5055"));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".rmw")).unwrap();
        fs::write(
            dir.path().join(".rmw/board.toml"),
            "[server]\nfeed_capacity = 0\n",
        )
        .unwrap();

        board(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("feed_capacity"));
    }

    #[test]
    fn test_broken_config_file_fails() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".rmw")).unwrap();
        fs::write(dir.path().join(".rmw/board.toml"), "[server\n").unwrap();

        board(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to parse board.toml"));
    }
}

// =============================================================================
// Client commands without a server
// =============================================================================

mod offline {
    use super::*;

    #[test]
    fn test_submit_with_empty_po_list_fails_before_connecting() {
        let dir = create_temp_project();
        board(&dir)
            .args([
                "--server",
                DEAD_SERVER,
                "submit",
                "--line",
                "12",
                "--po",
                " , ",
                "--required-time",
                "14:00",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("PO number list is empty"));
    }

    #[test]
    fn test_submit_with_blank_line_fails_before_connecting() {
        let dir = create_temp_project();
        board(&dir)
            .args([
                "--server",
                DEAD_SERVER,
                "submit",
                "--line",
                " ",
                "--po",
                "A1",
                "--required-time",
                "14:00",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("line_id"));
    }

    #[test]
    fn test_reset_without_terminal_is_cancelled() {
        let dir = create_temp_project();
        board(&dir)
            .args(["--server", DEAD_SERVER, "reset"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Reset cancelled"));
    }

    #[test]
    fn test_list_against_dead_server_fails() {
        let dir = create_temp_project();
        board(&dir)
            .args(["--server", DEAD_SERVER, "list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to synchronize clock"));
    }
}
