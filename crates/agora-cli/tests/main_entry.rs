//! Integration tests for the `agora` binary entry point.
//!
//! Verifies the command surface and the distinguishable exit codes for the
//! setup-phase error taxonomy.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use tempfile::TempDir;

struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("temp dir"),
        }
    }

    fn data_dir(&self) -> String {
        self.dir
            .path()
            .join("node")
            .to_str()
            .expect("utf-8 path")
            .to_string()
    }

    fn stub_daemon_binary(&self) -> String {
        let path = self.dir.path().join("ipfs");
        std::fs::write(&path, b"#!/bin/sh\nexit 0\n").expect("write stub binary");
        path.to_str().expect("utf-8 path").to_string()
    }

    fn missing_daemon_binary(&self) -> String {
        self.dir
            .path()
            .join("missing-daemon")
            .to_str()
            .expect("utf-8 path")
            .to_string()
    }
}

#[test]
fn help_lists_the_command_surface() {
    let mut command = cargo_bin_cmd!("agora");
    command.arg("--help");
    command
        .assert()
        .success()
        .stdout(contains("init"))
        .stdout(contains("daemon"));
}

#[test]
fn unknown_commands_exit_with_usage_failure() {
    let mut command = cargo_bin_cmd!("agora");
    command.arg("replicate");
    command.assert().code(2);
}

#[test]
fn init_without_daemon_exits_not_installed() {
    let sandbox = Sandbox::new();
    let mut command = cargo_bin_cmd!("agora");
    command.args([
        "--data-dir",
        &sandbox.data_dir(),
        "--daemon-bin",
        &sandbox.missing_daemon_binary(),
        "init",
    ]);
    command
        .assert()
        .code(10)
        .stderr(contains("not installed"));
}

#[test]
fn init_succeeds_with_a_stub_daemon_binary() {
    let sandbox = Sandbox::new();
    let mut command = cargo_bin_cmd!("agora");
    command.args([
        "--data-dir",
        &sandbox.data_dir(),
        "--daemon-bin",
        &sandbox.stub_daemon_binary(),
        "init",
    ]);
    command
        .assert()
        .success()
        .stdout(contains("initialised"));
}

#[test]
fn daemon_start_before_init_exits_not_initialised() {
    let sandbox = Sandbox::new();
    let mut command = cargo_bin_cmd!("agora");
    command.args([
        "--data-dir",
        &sandbox.data_dir(),
        "--api-endpoint",
        "tcp://127.0.0.1:1",
        "daemon",
        "start",
    ]);
    command.assert().code(14);
}

#[test]
fn daemon_status_on_a_fresh_node_reports_not_running() {
    let sandbox = Sandbox::new();
    let mut command = cargo_bin_cmd!("agora");
    command.args([
        "--data-dir",
        &sandbox.data_dir(),
        "--api-endpoint",
        "tcp://127.0.0.1:1",
        "daemon",
        "status",
    ]);
    command
        .assert()
        .success()
        .stdout(contains("not running"));
}

#[test]
fn corrupt_node_configuration_exits_config_corrupt() {
    let sandbox = Sandbox::new();
    let data_dir = sandbox.data_dir();
    let binary = sandbox.stub_daemon_binary();

    let mut init = cargo_bin_cmd!("agora");
    init.args(["--data-dir", &data_dir, "--daemon-bin", &binary, "init"]);
    init.assert().success();

    std::fs::write(
        std::path::Path::new(&data_dir).join("node.json"),
        b"{broken",
    )
    .expect("corrupt node config");

    let mut start = cargo_bin_cmd!("agora");
    start.args([
        "--data-dir",
        &data_dir,
        "--api-endpoint",
        "tcp://127.0.0.1:1",
        "daemon",
        "start",
    ]);
    start.assert().code(13);
}
