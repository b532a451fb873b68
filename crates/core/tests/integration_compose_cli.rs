//! Integration tests for the real CLI backend
//!
//! A small shell script stands in for `docker-compose`, so these tests spawn,
//! interrupt, kill and reap real processes and probe a real HTTP endpoint
//! without needing docker.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use stevedore_core::errors::{SetupError, ShutdownError, StevedoreError};
use stevedore_core::{Harness, HarnessConfig};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GRACEFUL_UP: &str = r#"trap 'echo "Gracefully stopping..."; exit 0' INT
    echo "app_1  | listening"
    while true; do sleep 0.1; done"#;

const STUBBORN_UP: &str = r#"trap '' INT
    echo "app_1  | ignoring interrupts"
    while true; do sleep 0.1; done"#;

/// Write an executable compose stand-in that records its arguments
fn fake_compose(dir: &Path, up_body: &str, pull_exit: i32) -> PathBuf {
    let calls = dir.join("calls");
    let script = format!(
        r#"#!/bin/sh
echo "$@" >> "{calls}"
case "$1" in
  pull)
    echo "Pulling app ... error"
    exit {pull_exit}
    ;;
  up)
    {up_body}
    ;;
  rm)
    echo "Removing app_1 ... done"
    ;;
esac
"#,
        calls = calls.display(),
        pull_exit = pull_exit,
        up_body = up_body,
    );
    let path = dir.join("fake-compose");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn recorded_calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

async fn healthy_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/health_check"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    server
}

fn config_for(dir: &TempDir, compose: PathBuf, server: &MockServer) -> HarnessConfig {
    HarnessConfig {
        compose_path: compose.display().to_string(),
        machine_path: dir.path().join("no-such-machine").display().to_string(),
        build_command: vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("echo build >> {}", dir.path().join("calls").display()),
        ],
        target_address: Some("127.0.0.1".to_string()),
        port: Some(server.address().port()),
        log_file: dir.path().join("logs").join("test.log"),
        poll_interval_ms: 50,
        readiness_timeout_ms: 5_000,
        shutdown_timeout_ms: 2_000,
        end_marker_delay_ms: 50,
        ..Default::default()
    }
}

#[tokio::test]
async fn full_cycle_against_fake_compose() {
    let dir = TempDir::new().unwrap();
    let server = healthy_server().await;
    let compose = fake_compose(dir.path(), GRACEFUL_UP, 0);
    let harness = Harness::new(config_for(&dir, compose, &server)).unwrap();

    for _ in 0..2 {
        let port = server.address().port();
        let seen = harness
            .run_test(|address| async move { address.http_url(Some(port), "/") })
            .await
            .unwrap();
        assert_eq!(seen, Some(format!("http://127.0.0.1:{}/", port)));
    }

    assert_eq!(
        recorded_calls(dir.path()),
        vec![
            "build",
            "pull",
            "up --force-recreate --no-color",
            "rm --force --stop",
            "up --force-recreate --no-color",
            "rm --force --stop",
        ]
    );

    let log = std::fs::read_to_string(dir.path().join("logs").join("test.log")).unwrap();
    assert!(log.starts_with("pulling Compose images...done\n"));
    assert_eq!(log.matches("app_1  | listening").count(), 2);
    assert_eq!(log.matches("Gracefully stopping...").count(), 2);
    let start = log.find("--- test 2 start\n").unwrap();
    let end = log.find("--- test 2 end\n").unwrap();
    assert!(log.find("--- test 1 end\n").unwrap() < start);
    assert!(start < end);
}

#[tokio::test]
async fn stubborn_process_is_killed_then_removed() {
    let dir = TempDir::new().unwrap();
    let server = healthy_server().await;
    let compose = fake_compose(dir.path(), STUBBORN_UP, 0);
    let mut config = config_for(&dir, compose, &server);
    config.shutdown_timeout_ms = 300;
    let harness = Harness::new(config).unwrap();

    let result = harness.run_test(|_| async {}).await;

    assert!(matches!(
        result,
        Err(StevedoreError::Shutdown(ShutdownError::KilledOnTimeout { .. }))
    ));
    assert_eq!(
        recorded_calls(dir.path()).last().map(String::as_str),
        Some("rm --force --stop")
    );
}

#[tokio::test]
async fn failed_pull_writes_output_to_log() {
    let dir = TempDir::new().unwrap();
    let server = healthy_server().await;
    let compose = fake_compose(dir.path(), GRACEFUL_UP, 1);
    let harness = Harness::new(config_for(&dir, compose, &server)).unwrap();

    let result = harness.run_test(|_| async {}).await;

    assert!(matches!(
        result,
        Err(StevedoreError::Setup(SetupError::Pull { .. }))
    ));
    let log = std::fs::read_to_string(dir.path().join("logs").join("test.log")).unwrap();
    assert_eq!(log, "pulling Compose images...Pulling app ... error\n");
    assert!(!recorded_calls(dir.path()).iter().any(|c| c.starts_with("up")));
}

#[tokio::test]
async fn missing_compose_binary_fails_to_start() {
    let dir = TempDir::new().unwrap();
    let server = healthy_server().await;
    let mut config = config_for(&dir, dir.path().join("no-such-compose"), &server);
    config.build_command = Vec::new();
    let harness = Harness::new(config).unwrap();

    let result = harness.run_test(|_| async {}).await;

    // The pull is the first orchestrator call and cannot run at all
    assert!(matches!(
        result,
        Err(StevedoreError::Setup(SetupError::Pull { .. }))
    ));
}

#[tokio::test]
async fn missing_machine_binary_falls_back_to_loopback() {
    let dir = TempDir::new().unwrap();
    let server = healthy_server().await;
    let compose = fake_compose(dir.path(), GRACEFUL_UP, 0);
    let mut config = config_for(&dir, compose, &server);
    config.target_address = None;
    let harness = Harness::new(config).unwrap();

    let address = harness.resolve_address().await.unwrap();
    assert_eq!(address.as_str(), "127.0.0.1");
}
