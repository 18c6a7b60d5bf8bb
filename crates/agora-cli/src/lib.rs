//! Command-line runtime for the `agora` community node tool.
//!
//! The module owns argument parsing, configuration bootstrapping, and
//! dispatch into the node lifecycle library. It is designed to be
//! exercised both from the binary entrypoint and from tests where
//! configuration loading and IO streams can be substituted.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;

use agora_config::Config;
use agora_node::service;
use agora_node::{
    CommandInstaller, InstallationProbe, Installer, Orchestrator, ProcessDaemonRuntime,
    UnconfiguredInstaller, telemetry,
};

mod cli;
mod config;
mod errors;
mod lifecycle;

use cli::{Cli, CliCommand, DaemonAction};
use config::{ConfigArgumentSplit, ConfigLoader, OrthoConfigLoader, split_config_arguments};
pub(crate) use errors::AppError;
use lifecycle::{LifecycleContext, LifecycleOutput, SystemLifecycle};

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

fn run_with_loader<I, W, E, L>(args: I, stdout: &mut W, stderr: &mut E, loader: &L) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);
    let cli_arguments = prepare_cli_arguments(&args, &split);

    let result = Cli::try_parse_from(cli_arguments)
        .map_err(AppError::CliUsage)
        .and_then(|cli| {
            loader
                .load(&split.config_arguments)
                .map(|config| (cli, config))
        })
        .and_then(|(cli, config)| dispatch(cli, &config, &split, stdout, stderr));

    match result {
        Ok(exit_code) => exit_code,
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            error.exit_code()
        }
    }
}

fn dispatch<W, E>(
    cli: Cli,
    config: &Config,
    split: &ConfigArgumentSplit,
    stdout: &mut W,
    stderr: &mut E,
) -> Result<ExitCode, AppError>
where
    W: Write,
    E: Write,
{
    telemetry::initialise(config)?;
    match cli.command {
        CliCommand::Init { install_daemon } => {
            let mut output = LifecycleOutput::new(&mut *stdout, &mut *stderr);
            run_init(config, install_daemon, &mut output)
        }
        CliCommand::Daemon {
            action: DaemonAction::Supervise,
        } => {
            service::run_supervisor(config)?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Daemon { action } => {
            let context = LifecycleContext {
                config,
                config_arguments: &split.config_arguments,
                supervisor_binary: None,
            };
            let mut output = LifecycleOutput::new(&mut *stdout, &mut *stderr);
            SystemLifecycle
                .handle(action, context, &mut output)
                .map_err(AppError::from)
        }
    }
}

fn run_init<W, E>(
    config: &Config,
    install_daemon: bool,
    output: &mut LifecycleOutput<&mut W, &mut E>,
) -> Result<ExitCode, AppError>
where
    W: Write,
    E: Write,
{
    let installer = build_installer(config);
    let runtime = build_runtime(config);
    let orchestrator = Orchestrator::new(config.clone(), installer, runtime);
    let node = orchestrator.init(install_daemon)?;
    output.stdout_line(format_args!(
        "community node '{}' initialised (data dir {}, {} bootstrap peers)",
        node.community,
        node.data_dir,
        node.bootstrap_peers.len()
    ))?;
    Ok(ExitCode::SUCCESS)
}

fn build_installer(config: &Config) -> Box<dyn Installer> {
    match config.install_command() {
        Some(line) => match CommandInstaller::from_command_line(line) {
            Ok(installer) => Box::new(installer),
            Err(_) => Box::new(UnconfiguredInstaller),
        },
        None => Box::new(UnconfiguredInstaller),
    }
}

fn build_runtime(config: &Config) -> ProcessDaemonRuntime {
    // `init` never spawns the daemon; the resolved binary only matters for
    // the supervision service, which resolves it again itself.
    let binary = InstallationProbe::new(config.daemon_bin.clone())
        .resolve_daemon_binary()
        .map_or_else(
            || OsString::from(agora_config::DEFAULT_DAEMON_BIN),
            OsString::from,
        );
    ProcessDaemonRuntime::new(binary)
}

fn prepare_cli_arguments(args: &[OsString], split: &ConfigArgumentSplit) -> Vec<OsString> {
    let mut cli_arguments: Vec<OsString> = Vec::new();
    if let Some(first) = args.first() {
        cli_arguments.push(first.clone());
    }
    if split.command_start < args.len() {
        cli_arguments.extend(args[split.command_start..].iter().cloned());
    }
    cli_arguments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{EXIT_NOT_INITIALIZED, EXIT_NOT_INSTALLED};
    use std::ffi::OsString;
    use tempfile::TempDir;

    fn run_cli(args: &[&str]) -> (ExitCode, String, String) {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let os_args: Vec<OsString> = args.iter().map(OsString::from).collect();
        let code = run(os_args, &mut stdout, &mut stderr);
        (
            code,
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
        )
    }

    fn temp_data_dir() -> (TempDir, String) {
        let dir = TempDir::new().expect("temp dir");
        let data_dir = dir
            .path()
            .join("node")
            .to_str()
            .expect("utf-8 path")
            .to_string();
        (dir, data_dir)
    }

    #[test]
    fn usage_errors_exit_with_code_two() {
        let (code, _, stderr) = run_cli(&["agora", "no-such-command"]);
        assert_eq!(code, ExitCode::from(2));
        assert!(!stderr.is_empty());
    }

    #[test]
    fn init_without_daemon_reports_not_installed() {
        let (_dir, data_dir) = temp_data_dir();
        let missing = format!("{data_dir}/missing-daemon-binary");
        let (code, _, stderr) = run_cli(&[
            "agora",
            "--data-dir",
            &data_dir,
            "--daemon-bin",
            &missing,
            "init",
        ]);
        assert_eq!(code, ExitCode::from(EXIT_NOT_INSTALLED));
        assert!(stderr.contains("not installed"));
    }

    #[test]
    fn daemon_start_before_init_reports_not_initialised() {
        let (_dir, data_dir) = temp_data_dir();
        let (code, _, stderr) = run_cli(&[
            "agora",
            "--data-dir",
            &data_dir,
            "--api-endpoint",
            "tcp://127.0.0.1:1",
            "daemon",
            "start",
        ]);
        assert_eq!(code, ExitCode::from(EXIT_NOT_INITIALIZED));
        assert!(stderr.contains("lifecycle"));
    }

    #[test]
    fn init_with_stub_binary_succeeds_and_is_idempotent() {
        let (dir, data_dir) = temp_data_dir();
        let binary = dir.path().join("ipfs");
        std::fs::write(&binary, b"#!/bin/sh\n").expect("write stub binary");
        let binary = binary.to_str().expect("utf-8 path").to_string();

        let args = [
            "agora",
            "--data-dir",
            data_dir.as_str(),
            "--daemon-bin",
            binary.as_str(),
            "init",
        ];
        let (code, stdout, _) = run_cli(&args);
        assert_eq!(code, ExitCode::SUCCESS);
        assert!(stdout.contains("initialised"));

        let (code, stdout, _) = run_cli(&args);
        assert_eq!(code, ExitCode::SUCCESS, "repeated init must succeed");
        assert!(stdout.contains("initialised"));
    }

    #[test]
    fn daemon_status_on_fresh_node_reports_not_running() {
        let (_dir, data_dir) = temp_data_dir();
        let (code, stdout, _) = run_cli(&[
            "agora",
            "--data-dir",
            &data_dir,
            "--api-endpoint",
            "tcp://127.0.0.1:1",
            "daemon",
            "status",
        ]);
        assert_eq!(code, ExitCode::SUCCESS);
        assert!(stdout.contains("not running"));
    }
}
