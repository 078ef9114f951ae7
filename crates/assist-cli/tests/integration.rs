use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn assist(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("assist").unwrap();
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env("ASSIST_CONFIG", dir.path().join("config.yaml"))
        .env_remove("ASSIST_PROJECT")
        .env_remove("ASSIST_BACKEND_URL")
        .env_remove("ASSIST_COMPLETION_URL");
    cmd
}

fn write_config(dir: &TempDir, yaml: &str) {
    std::fs::write(dir.path().join("config.yaml"), yaml).unwrap();
}

// ---------------------------------------------------------------------------
// assist parse
// ---------------------------------------------------------------------------

#[test]
fn parse_resolves_aliases_and_keeps_the_remainder() {
    let dir = TempDir::new().unwrap();
    let out = assist(&dir)
        .args(["parse", "/h run-foundation", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["name"], "help");
    assert_eq!(v["resolved"], true);
    assert_eq!(v["raw_args"][0], "run-foundation");
}

#[test]
fn parse_quoted_argument_text_output() {
    let dir = TempDir::new().unwrap();
    assist(&dir)
        .args(["parse", r#"/create-stakeholder "John Smith" sponsor"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("command: /create-stakeholder"))
        .stdout(predicate::str::contains(r#"name = "John Smith""#))
        .stdout(predicate::str::contains(r#"role = "sponsor""#));
}

#[test]
fn parse_marks_unknown_commands() {
    let dir = TempDir::new().unwrap();
    assist(&dir)
        .args(["parse", "/frobnicate now"])
        .assert()
        .success()
        .stdout(predicate::str::contains("command: /frobnicate (unknown)"));
}

#[test]
fn parse_rejects_plain_text() {
    let dir = TempDir::new().unwrap();
    assist(&dir)
        .args(["parse", "hello there"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a command"));
}

// ---------------------------------------------------------------------------
// assist commands / modes
// ---------------------------------------------------------------------------

#[test]
fn commands_lists_usage() {
    let dir = TempDir::new().unwrap();
    assist(&dir)
        .arg("commands")
        .assert()
        .success()
        .stdout(predicate::str::contains("/create-stakeholder <name> [role]"))
        .stdout(predicate::str::contains("/help"));
}

#[test]
fn commands_json_is_an_array() {
    let dir = TempDir::new().unwrap();
    let out = assist(&dir)
        .args(["commands", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let names: Vec<&str> = v
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert!(names.contains(&"run-foundation"));
    assert!(names.contains(&"update-status"));
}

#[test]
fn modes_maps_views() {
    let dir = TempDir::new().unwrap();
    assist(&dir)
        .arg("modes")
        .assert()
        .success()
        .stdout(predicate::str::contains("business-drivers"))
        .stdout(predicate::str::contains("strategy"));
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

#[test]
fn invalid_config_fails_with_path() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "idle_threshold_secs: 0\n");
    assist(&dir)
        .arg("commands")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"))
        .stderr(predicate::str::contains("invalid config"));
}

// ---------------------------------------------------------------------------
// assist repl
// ---------------------------------------------------------------------------

#[test]
fn repl_runs_commands_and_host_events() {
    let dir = TempDir::new().unwrap();
    assist(&dir)
        .arg("repl")
        .write_stdin("/status\n:view personas\n:quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Readiness: not scored yet"))
        .stdout(predicate::str::contains("view: personas (mode: personas)"))
        .stdout(predicate::str::contains("Switched to personas mode"));
}

#[test]
fn repl_free_text_without_completion_points_to_help() {
    let dir = TempDir::new().unwrap();
    assist(&dir)
        .arg("repl")
        .write_stdin("what should I do next?\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("/help"));
}

#[test]
fn repl_suggestions_respect_config_limit() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "max_suggestions: 1\n");
    assist(&dir)
        .arg("repl")
        .write_stdin("/cre\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Did you mean /create-stakeholder?"));
}

#[test]
fn repl_processing_event_offers_review_action() {
    let dir = TempDir::new().unwrap();
    assist(&dir)
        .arg("repl")
        .write_stdin(
            ":data {\"pending_confirmations\": 2}\n\
             :event processed signals 9 1\n\
             :action nudge-review\n",
        )
        .assert()
        .success()
        .stdout(predicate::str::contains("9 processed, 1 failed"))
        .stdout(predicate::str::contains("[ok] 2 items are awaiting confirmation."));
}

#[test]
fn repl_host_event_errors_do_not_end_the_session() {
    let dir = TempDir::new().unwrap();
    assist(&dir)
        .arg("repl")
        .write_stdin(":dismiss 7\n:bogus\n/status\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("unknown host event :bogus"))
        .stdout(predicate::str::contains("Readiness"));
}

#[test]
fn repl_json_mode_emits_json_lines() {
    let dir = TempDir::new().unwrap();
    let out = assist(&dir)
        .args(["repl", "--json"])
        .write_stdin("/status\n")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(out).unwrap();
    let first = text.lines().next().unwrap();
    let v: serde_json::Value = serde_json::from_str(first).unwrap();
    assert_eq!(v["role"], "assistant");
    assert!(v["content"].as_str().unwrap().contains("Readiness"));
}
