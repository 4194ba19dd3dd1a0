use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

const CHAT_LOG: &str = r#"{"event":"user_message","content":"hi"}
{"event":"append_chunk","text":"**Hel"}
{"event":"append_chunk","text":"lo**"}
{"event":"finalize"}
"#;

#[test]
fn test_replay_chat_transcript() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("session.jsonl");
    fs::write(&log, CHAT_LOG).unwrap();

    cargo_bin_cmd!("lumen")
        .env("LUMEN_HOME", dir.path())
        .arg("replay")
        .arg(&log)
        .assert()
        .success()
        .stdout(predicate::str::contains("surface user"))
        .stdout(predicate::str::contains("<strong>Hello</strong>"));
}

#[test]
fn test_replay_effects() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("lumen")
        .env("LUMEN_HOME", dir.path())
        .args(["replay", "--effects"])
        .write_stdin(CHAT_LOG)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"effect":"lock_controls"}"#))
        .stdout(predicate::str::contains(r#"{"effect":"release_controls"}"#))
        .stdout(predicate::str::contains("<strong>").not());
}

#[test]
fn test_replay_run_panel() {
    let dir = tempdir().unwrap();
    let log = r#"{"event":"switch_view","view":"maestro"}
{"event":"start_run"}
{"event":"run_step_started","title":"Writer"}
{"event":"run_step_chunk","text":"draft"}
{"event":"run_step_finalized","title":"Writer"}
{"event":"final_report","content":"Final *report*"}
"#;

    cargo_bin_cmd!("lumen")
        .env("LUMEN_HOME", dir.path())
        .arg("replay")
        .write_stdin(log)
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Writer"))
        .stdout(predicate::str::contains("<em>report</em>"));
}

#[test]
fn test_replay_invalid_event_reports_line() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("lumen")
        .env("LUMEN_HOME", dir.path())
        .arg("replay")
        .write_stdin("{\"event\":\"finalize\"}\n{\"event\":\"nope\"}\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 2"));
}
