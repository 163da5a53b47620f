//! Runs the `redraft` binary against a scratch document.

use std::io::Write;
use std::process::{Command, Output};

const DOCUMENT: &str = "One para.\n\nTwo para.";

fn redraft(args: &[&str]) -> Output {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(DOCUMENT.as_bytes()).unwrap();

    Command::new(env!("CARGO_BIN_EXE_redraft"))
        .args(args)
        .arg(file.path())
        // Force log output so the test shows where it goes.
        .env("RUST_LOG", "info")
        .output()
        .unwrap()
}

#[test]
fn dry_run_prints_only_the_document_on_stdout() {
    let out = redraft(&["run", "-i", "tighten", "--dry-run"]);

    assert!(out.status.success());
    assert_eq!(String::from_utf8(out.stdout).unwrap(), format!("{DOCUMENT}\n"));
    let logs = String::from_utf8(out.stderr).unwrap();
    assert!(logs.contains("Dry run"));
}

#[test]
fn json_outcome_is_parseable_from_stdout() {
    let out = redraft(&["run", "-i", "tighten", "--dry-run", "--json"]);

    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["status"], "completed");
    assert_eq!(value["text"], DOCUMENT);
}

#[test]
fn plan_listing_is_clean() {
    let out = redraft(&["plan"]);

    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.starts_with("1 chunk(s)"));
    assert!(!stdout.contains("INFO"));
}
