//! Command-line behavior: argument handling, exit codes and full runs
//! against a local XRPC server

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DID: &str = "did:plc:alice";

/// Helper to create a config file in a fresh temp directory
fn setup_config(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, content).unwrap();
    (temp_dir, config_path)
}

fn account_config(pds_url: &str) -> String {
    format!(
        r#"
[account]
handle = "alice.test"

[service]
pds_url = "{}"

[deletion]
max_attempts = 1
retry_base_delay_ms = 0
"#,
        pds_url
    )
}

fn skeetsweep(config_path: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("skeetsweep").unwrap();
    cmd.arg("--config")
        .arg(config_path)
        .env_remove("SKEETSWEEP_APP_PASSWORD")
        .env_remove("SKEETSWEEP_LOG_LEVEL");
    cmd
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("skeetsweep")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("posts"))
        .stdout(predicate::str::contains("reposts"))
        .stdout(predicate::str::contains("EXIT CODES"));
}

#[test]
fn test_posts_help_lists_rules() {
    Command::cargo_bin("skeetsweep")
        .unwrap()
        .args(["posts", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--min-likes"))
        .stdout(predicate::str::contains("--protect-threads"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_version() {
    Command::cargo_bin("skeetsweep")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_invalid_before_date_exits_3() {
    let (_dir, config) = setup_config(&account_config("http://127.0.0.1:9"));

    skeetsweep(&config)
        .args(["posts", "--before", "2024-13-45"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid --before date"));
}

#[test]
fn test_invalid_older_than_exits_3() {
    let (_dir, config) = setup_config(&account_config("http://127.0.0.1:9"));

    skeetsweep(&config)
        .args(["reposts", "--older-than", "soon"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid --older-than"));
}

#[test]
fn test_reposts_require_cutoff() {
    let (_dir, config) = setup_config(&account_config("http://127.0.0.1:9"));

    skeetsweep(&config)
        .arg("reposts")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("needs a cutoff"));
}

#[test]
fn test_cutoff_flags_conflict() {
    let (_dir, config) = setup_config(&account_config("http://127.0.0.1:9"));

    skeetsweep(&config)
        .args(["reposts", "--before", "2024-01-01", "--older-than", "30days"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_invalid_delete_mode_rejected() {
    let (_dir, config) = setup_config(&account_config("http://127.0.0.1:9"));

    skeetsweep(&config)
        .args(["reposts", "--before", "2024-01-01", "--mode", "bulk"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid delete mode"));
}

#[test]
fn test_missing_handle() {
    let (_dir, config) = setup_config("[service]\npds_url = \"http://127.0.0.1:9\"\n");

    skeetsweep(&config)
        .args(["posts", "--dry-run"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("account.handle"));
}

#[test]
fn test_invalid_config_file() {
    let (_dir, config) = setup_config("[deletion]\nbatch_size = 500\n");

    skeetsweep(&config)
        .args(["posts", "--dry-run"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("deletion.batch_size"));
}

#[test]
fn test_empty_password_on_stdin_exits_2() {
    let (_dir, config) = setup_config(&account_config("http://127.0.0.1:9"));

    skeetsweep(&config)
        .args(["--password-stdin", "posts", "--dry-run"])
        .write_stdin("")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Empty password"));
}

#[test]
fn test_unreachable_pds() {
    let (_dir, config) = setup_config(&account_config("http://127.0.0.1:9"));

    skeetsweep(&config)
        .env("SKEETSWEEP_APP_PASSWORD", "app-pass")
        .args(["posts", "--dry-run"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Network error"));
}

async fn mount_session(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.server.createSession"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessJwt": "jwt",
            "refreshJwt": "refresh",
            "did": DID,
            "handle": "alice.test"
        })))
        .mount(server)
        .await;
}

async fn mount_reposts(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/xrpc/com.atproto.repo.listRecords"))
        .and(query_param("collection", "app.bsky.feed.repost"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [
                {
                    "uri": "at://did:plc:alice/app.bsky.feed.repost/new",
                    "value": {"createdAt": "2024-06-01T00:00:00.000Z"}
                },
                {
                    "uri": "at://did:plc:alice/app.bsky.feed.repost/old",
                    "value": {"createdAt": "2023-06-01T00:00:00.000Z"}
                }
            ]
        })))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wrong_password_exits_2() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.server.createSession"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "AuthenticationRequired",
            "message": "Invalid identifier or password"
        })))
        .mount(&server)
        .await;
    let (_dir, config) = setup_config(&account_config(&server.uri()));

    skeetsweep(&config)
        .env("SKEETSWEEP_APP_PASSWORD", "wrong")
        .args(["reposts", "--before", "2024-01-01", "--dry-run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid Bluesky credentials"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reposts_dry_run_json() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_reposts(&server).await;
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.repo.applyWrites"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;
    let (_dir, config) = setup_config(&account_config(&server.uri()));

    let output = skeetsweep(&config)
        .env("SKEETSWEEP_APP_PASSWORD", "app-pass")
        .args(["reposts", "--before", "2024-01-01", "--dry-run", "--format", "json"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(outcome["analysis"]["total"], 2);
    assert_eq!(
        outcome["analysis"]["to_delete"],
        json!(["at://did:plc:alice/app.bsky.feed.repost/old"])
    );
    assert!(outcome["report"].is_null());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reposts_deleted_with_yes() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_reposts(&server).await;
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.repo.applyWrites"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    let (_dir, config) = setup_config(&account_config(&server.uri()));

    skeetsweep(&config)
        .env("SKEETSWEEP_APP_PASSWORD", "app-pass")
        .args(["reposts", "--before", "2024-01-01", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 created before 2024-01-01"))
        .stdout(predicate::str::contains("Deleted 1 of 1 (0 failed)"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_deletion_without_yes_is_refused_off_terminal() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_reposts(&server).await;
    let (_dir, config) = setup_config(&account_config(&server.uri()));

    skeetsweep(&config)
        .env("SKEETSWEEP_APP_PASSWORD", "app-pass")
        .args(["reposts", "--before", "2024-01-01"])
        .write_stdin("")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("--yes"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_deletions_exit_1() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_reposts(&server).await;
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.repo.applyWrites"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "InvalidRequest",
            "message": "Could not locate record"
        })))
        .mount(&server)
        .await;
    let (_dir, config) = setup_config(&account_config(&server.uri()));

    skeetsweep(&config)
        .env("SKEETSWEEP_APP_PASSWORD", "app-pass")
        .args(["reposts", "--before", "2024-01-01", "--yes"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Deleted 0 of 1 (1 failed)"))
        .stderr(predicate::str::contains("1 of 1 deletions failed"));
}
