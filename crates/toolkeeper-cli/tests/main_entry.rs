//! Integration tests for the `toolkeeper` binary entry point.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use tempfile::TempDir;

fn sandboxed(dir: &TempDir) -> assert_cmd::Command {
    let mut command = cargo_bin_cmd!("toolkeeper");
    command
        .env("TOOLKEEPER_RUNTIME_DIR", dir.path().join("run"))
        .env("TOOLKEEPER_HOST_CONFIG_PATH", dir.path().join("mcp.json"))
        .env("TOOLKEEPER_PACKAGE_ROOT", dir.path());
    command
}

#[test]
fn help_lists_subcommands() {
    let mut command = cargo_bin_cmd!("toolkeeper");
    command.arg("--help");
    command
        .assert()
        .success()
        .stdout(contains("start"))
        .stdout(contains("clear-logs"));
}

#[test]
fn missing_subcommand_is_rejected() {
    let mut command = cargo_bin_cmd!("toolkeeper");
    command.assert().failure().stderr(contains("Usage"));
}

#[test]
fn invalid_port_fails_configuration() {
    let dir = TempDir::new().expect("create temp dir");
    let mut command = sandboxed(&dir);
    command.args(["--server-port", "not-a-port", "status"]);
    command
        .assert()
        .failure()
        .stderr(contains("failed to load configuration"));
}

#[test]
fn status_json_is_machine_readable() {
    let dir = TempDir::new().expect("create temp dir");
    let mut command = sandboxed(&dir);
    command.args(["--server-port", "1", "status", "--json"]);

    let output = command.assert().success().get_output().stdout.clone();
    let status: serde_json::Value = serde_json::from_slice(&output).expect("status is JSON");

    assert_eq!(status["server_running"], false);
    assert_eq!(status["config_valid"], false);
    assert!(dir.path().join("run").is_dir());
}

#[test]
fn uninstall_without_host_config_succeeds() {
    let dir = TempDir::new().expect("create temp dir");
    let mut command = sandboxed(&dir);
    command.arg("uninstall");
    command.assert().success().stdout(contains("browser-tools"));
    assert!(!dir.path().join("mcp.json").exists());
}
