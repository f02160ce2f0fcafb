/// Integration tests for the RepoVault binary.
/// These tests run the actual binary and check exit codes and output.
mod common;

use assert_fs::prelude::*;
use common::{TestEnvironment, TOKEN};
use predicates::prelude::*;
use serde_json::json;
use std::io::Write;
use std::process::{Command, Output, Stdio};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BIN: &str = env!("CARGO_BIN_EXE_repovault");

fn command() -> Command {
    let mut cmd = Command::new(BIN);
    cmd.env_remove("BACKUP_DIR").env_remove("RUST_LOG");
    cmd
}

fn run_with_stdin(input: &str) -> Output {
    let mut child = command()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to start repovault");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().expect("Failed to wait for repovault")
}

/// Run the binary off the async runtime so the mock server keeps serving
async fn run_with_config(config: std::path::PathBuf) -> Output {
    tokio::task::spawn_blocking(move || {
        command()
            .arg(config)
            .output()
            .expect("Failed to run repovault")
    })
    .await
    .unwrap()
}

async fn mount_empty_github(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"login": "alice"})))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(server)
        .await;
}

#[test]
fn test_cli_help() {
    let output = command().arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[CONFIG]"));
    assert!(stdout.contains("--dry-run"));
    assert!(stdout.contains("--strict"));
}

#[test]
fn test_cli_version() {
    let output = command().arg("--version").output().unwrap();

    assert!(output.status.success());
    assert!(predicate::str::contains("repovault").eval(&String::from_utf8_lossy(&output.stdout)));
}

#[test]
fn test_empty_list_is_a_usage_error() {
    let output = run_with_stdin("[]");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_unparseable_input_is_a_usage_error() {
    let output = run_with_stdin("{\"token\": \"t\"");
    assert_eq!(output.status.code(), Some(2));

    let output = run_with_stdin("{\"token\": \"t\", \"method\": \"github\"}");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_missing_config_file_is_a_usage_error() {
    let temp_dir = assert_fs::TempDir::new().unwrap();
    let output = command()
        .arg(temp_dir.child("absent.json").path())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_invalid_record_fails_the_run() {
    let output = run_with_stdin(r#"[{"method": "github", "directory": "/tmp"}]"#);

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(predicate::str::contains("Record 0 failed").eval(&stdout));
    assert!(predicate::str::contains("token").eval(&stdout));
}

#[tokio::test]
async fn test_successful_run_exits_zero() {
    let env = TestEnvironment::new();
    let server = MockServer::start().await;
    mount_empty_github(&server).await;

    let config = env.write_config(&json!([{
        "token": TOKEN,
        "method": "github",
        "host": server.uri(),
        "directory": env.backup_dir,
    }]));
    let output = run_with_config(config).await;

    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(env.backup_dir.is_dir());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(predicate::str::contains("alice").eval(&stderr));
    assert!(!stderr.contains(TOKEN));
    assert!(!String::from_utf8_lossy(&output.stdout).contains(TOKEN));
}

#[tokio::test]
async fn test_bad_record_does_not_stop_the_next_one() {
    let env = TestEnvironment::new();
    let server = MockServer::start().await;
    mount_empty_github(&server).await;

    let config = env.write_config(&json!([
        {"method": "github", "directory": env.backup_dir},
        {"token": TOKEN, "method": "github", "host": server.uri(), "directory": env.backup_dir},
    ]));
    let output = run_with_config(config).await;

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(predicate::str::contains("Record 0 failed").eval(&stdout));
    assert!(predicate::str::contains("Backup complete for record 1").eval(&stdout));
}

#[tokio::test]
async fn test_rejected_token_fails_without_leaking_it() {
    let env = TestEnvironment::new();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let config = env.write_config(&json!([{
        "token": TOKEN,
        "method": "github",
        "host": server.uri(),
        "directory": env.backup_dir,
    }]));
    let output = run_with_config(config).await;

    assert_eq!(output.status.code(), Some(1));
    assert!(!String::from_utf8_lossy(&output.stdout).contains(TOKEN));
    assert!(!String::from_utf8_lossy(&output.stderr).contains(TOKEN));
}

#[tokio::test]
async fn test_yaml_config_file() {
    let env = TestEnvironment::new();
    let server = MockServer::start().await;
    mount_empty_github(&server).await;

    let config = env.temp_dir.path().join("backups.yml");
    std::fs::write(
        &config,
        format!(
            "- token: {}\n  provider: github\n  host: {}\n  directory: {}\n",
            TOKEN,
            server.uri(),
            env.backup_dir.display()
        ),
    )
    .unwrap();
    let output = run_with_config(config).await;

    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
}
