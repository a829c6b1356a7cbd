//! Binary smoke tests

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `wp` isolated from the user's config and data directories
fn wp(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("wp").unwrap();
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("XDG_DATA_HOME", home.path().join("data"))
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    wp(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("prompts"))
        .stdout(predicate::str::contains("--screenshots-dir"))
        .stdout(predicate::str::contains("Logs are written to:"));
}

#[test]
fn test_config_prints_defaults() {
    let home = TempDir::new().unwrap();
    wp(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("provider: gemini"))
        .stdout(predicate::str::contains("max-steps: 100"));
}

#[test]
fn test_config_reads_local_file() {
    let home = TempDir::new().unwrap();
    std::fs::write(
        home.path().join(".webpilot.yml"),
        "oracle:\n  provider: anthropic\nagent:\n  command: my-agent\n",
    )
    .unwrap();

    wp(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("provider: anthropic"))
        .stdout(predicate::str::contains("command: my-agent"));
}

#[test]
fn test_prompts_lists_and_prints() {
    let home = TempDir::new().unwrap();
    wp(&home)
        .arg("prompts")
        .assert()
        .success()
        .stdout(predicate::str::contains("planning"))
        .stdout(predicate::str::contains("diagnosis"))
        .stdout(predicate::str::contains("lookup"));

    wp(&home)
        .args(["prompts", "planning"])
        .assert()
        .success()
        .stdout(predicate::str::contains("complete"));
}

#[test]
fn test_unknown_prompt_fails() {
    let home = TempDir::new().unwrap();
    wp(&home)
        .args(["prompts", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Prompt template not found"));
}

#[test]
fn test_session_without_api_key_fails_fast() {
    let home = TempDir::new().unwrap();
    wp(&home)
        .env_remove("GOOGLE_API_KEY")
        .arg("book a flight")
        .assert()
        .failure()
        .stderr(predicate::str::contains("GOOGLE_API_KEY"));
}
