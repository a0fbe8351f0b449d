//! CLI smoke tests for `fl`.
//!
//! Runs the binary against a temp data directory, optionally pre-populated
//! with record units, and checks operator output and on-disk effects.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const FINGERPRINT: &str = "ab12ab12ab12ab12ab12ab12ab12ab12ab12ab12ab12ab12ab12ab12ab12ab12";

fn fl(data_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("fl").expect("fl binary");
    cmd.env_remove("FAULTLINE_DATA_DIR")
        .env_remove("FAULTLINE_CONFIG")
        .env_remove("RUST_LOG")
        .arg("--log-level")
        .arg("error")
        .arg("--data-dir")
        .arg(data_dir);
    cmd
}

/// Data directory holding one record seen three times.
fn populated() -> TempDir {
    let dir = TempDir::new().expect("create temp dir");
    let unit = serde_json::json!({
        "fingerprint": FINGERPRINT,
        "reporter": "Alice",
        "duplicates": 2,
        "involved_components": ["Arena_v2.0 by kit"],
        "loaded_components": "Arena_v2.0 by kit; faultline_v0.1.0 by ops",
        "error": {
            "type": "NullRef",
            "message": "npe at X (actor=%actor%) while joining the arena lobby queue",
            "file": "a.src",
            "line": 10,
            "trace": "0: minigames::arena::join"
        },
        "first_seen_ms": 1_700_000_000_000_u64,
        "last_seen_ms": 1_700_000_100_000_u64
    });
    std::fs::write(
        dir.path().join(format!("{FINGERPRINT}.json")),
        serde_json::to_string_pretty(&unit).unwrap(),
    )
    .expect("write unit");
    dir
}

#[test]
fn empty_store_lists_no_errors() {
    let dir = TempDir::new().unwrap();
    fl(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("no errors logged"));
}

#[test]
fn missing_subcommand_prints_usage() {
    let dir = TempDir::new().unwrap();
    fl(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: /faultline"));
}

#[test]
fn list_truncates_message_and_counts_occurrences() {
    let dir = populated();
    fl(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "0: npe at X (actor=%actor%) while joining the arena l - 3 occurrences",
        ));
}

#[test]
fn show_prints_details_and_not_found() {
    let dir = populated();
    fl(dir.path())
        .args(["show", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Involved components: Arena_v2.0 by kit"))
        .stdout(predicate::str::contains("Duplicates: 2"));

    fl(dir.path())
        .args(["show", "4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Error 4 not found"));
}

#[test]
fn remove_moves_unit_into_archive() {
    let dir = populated();
    fl(dir.path())
        .args(["remove", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Error 0 archived."));

    let unit = format!("{FINGERPRINT}.json");
    assert!(!dir.path().join(&unit).exists());
    assert!(dir.path().join("archived").join(&unit).is_file());
}

#[test]
fn cause_is_refused_on_console() {
    let dir = TempDir::new().unwrap();
    fl(dir.path())
        .arg("cause")
        .assert()
        .success()
        .stdout(predicate::str::contains("interactive actor"));

    let units = std::fs::read_dir(dir.path())
        .unwrap()
        .filter(|e| e.as_ref().unwrap().path().is_file())
        .count();
    assert_eq!(units, 0);
}

#[test]
fn missing_config_file_fails_with_remediation() {
    let dir = TempDir::new().unwrap();
    fl(dir.path())
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"))
        .stderr(predicate::str::contains("To fix:"));
}
