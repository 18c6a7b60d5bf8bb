//! High-level orchestration for daemon lifecycle commands.
//!
//! Wires the start/stop/status flows together so the CLI drives a single
//! entrypoint when managing the resident supervision service.

use std::io::Write;
use std::process::ExitCode;
use std::time::{Duration, SystemTime};

use agora_config::RuntimePaths;
use agora_node::ConfigStore;
use agora_node::health::{self, HealthState};

use super::error::LifecycleError;
use super::monitoring::{read_pid, wait_for_ready};
use super::shutdown::{probe_endpoint, signal_supervisor, wait_for_shutdown};
use super::spawning::spawn_supervisor;
use super::types::{LifecycleContext, LifecycleOutput};
use crate::cli::DaemonAction;

// Covers the service's own 10s liveness budget plus daemonisation slack.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Production lifecycle controller.
#[derive(Debug, Default)]
pub(crate) struct SystemLifecycle;

impl SystemLifecycle {
    pub(crate) fn handle<W: Write, E: Write>(
        &mut self,
        action: DaemonAction,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        match action {
            DaemonAction::Start => self.start(context, output),
            DaemonAction::Stop => self.stop(context, output),
            DaemonAction::Status => self.status(context, output),
            // `supervise` is handled by the runtime before reaching here.
            DaemonAction::Supervise => Ok(ExitCode::SUCCESS),
        }
    }

    fn start<W: Write, E: Write>(
        &mut self,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        let endpoint = context.config.api_endpoint();
        if probe_endpoint(endpoint)? {
            return Err(LifecycleError::EndpointInUse {
                endpoint: endpoint.to_string(),
            });
        }
        // Refuse before spawning anything when the node was never
        // initialised; the error is clearer from here than from the
        // detached service.
        ConfigStore::new(context.config.data_dir.clone()).load()?;

        let paths = RuntimePaths::from_data_dir(context.config.data_dir())?;
        let mut child = spawn_supervisor(context)?;
        let started_at = SystemTime::now();
        let snapshot = wait_for_ready(&paths, &mut child, started_at, STARTUP_TIMEOUT)?;
        output.stdout_line(format_args!(
            "daemon ready (supervisor pid {}) on {}",
            snapshot.pid, endpoint
        ))?;
        output.stderr_line(format_args!(
            "runtime artefacts stored under {}",
            paths.runtime_dir().display()
        ))?;
        Ok(ExitCode::SUCCESS)
    }

    fn stop<W: Write, E: Write>(
        &mut self,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        let endpoint = context.config.api_endpoint();
        let paths = RuntimePaths::from_data_dir_readonly(context.config.data_dir());
        let pid = read_pid(paths.pid_path())?;
        let Some(pid) = pid else {
            if probe_endpoint(endpoint)? {
                return Err(LifecycleError::MissingPidWithEndpoint {
                    path: paths.pid_path().to_path_buf(),
                    endpoint: endpoint.to_string(),
                });
            }
            output.stdout_line(format_args!(
                "daemon is not running (pid file missing at {})",
                paths.pid_path().display()
            ))?;
            return Ok(ExitCode::SUCCESS);
        };
        signal_supervisor(pid)?;
        wait_for_shutdown(&paths, endpoint)?;
        output.stdout_line(format_args!("daemon (supervisor pid {pid}) stopped cleanly"))?;
        output.stderr_line(format_args!(
            "removed runtime artefacts from {}",
            paths.runtime_dir().display()
        ))?;
        Ok(ExitCode::SUCCESS)
    }

    fn status<W: Write, E: Write>(
        &mut self,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        let endpoint = context.config.api_endpoint();
        let paths = RuntimePaths::from_data_dir_readonly(context.config.data_dir());
        if !paths.runtime_dir().exists() {
            output.stdout_line(format_args!(
                "daemon is not running; use 'agora daemon start' to launch it."
            ))?;
            return Ok(ExitCode::SUCCESS);
        }
        if let Some(snapshot) = health::read_health(paths.health_path())? {
            let state = match snapshot.status {
                HealthState::Starting => "starting",
                HealthState::Ready => "running",
                HealthState::Stopping => "stopping",
            };
            output.stdout_line(format_args!(
                "daemon status: {} (supervisor pid {}) via {}",
                state, snapshot.pid, endpoint
            ))?;
            return Ok(ExitCode::SUCCESS);
        }
        let reachable = probe_endpoint(endpoint)?;
        match read_pid(paths.pid_path())? {
            Some(pid) => {
                output.stdout_line(format_args!(
                    "supervisor recorded pid {pid} but the health snapshot is missing; check {}",
                    paths.health_path().display()
                ))?;
            }
            None if reachable => {
                output.stdout_line(format_args!(
                    "daemon endpoint {} is answering but runtime files are missing; consider 'agora daemon stop' or removing {}",
                    endpoint,
                    paths.runtime_dir().display()
                ))?;
            }
            None => {
                output.stdout_line(format_args!(
                    "daemon is not running; use 'agora daemon start' to launch it."
                ))?;
            }
        }
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_config::{ApiEndpoint, Config};
    use agora_node::StoreError;
    use camino::Utf8PathBuf;
    use std::net::TcpListener;
    use tempfile::TempDir;

    fn context_config(data_dir: Utf8PathBuf, endpoint: ApiEndpoint) -> Config {
        Config {
            data_dir,
            api_endpoint: endpoint,
            ..Config::default()
        }
    }

    fn run_action(
        action: DaemonAction,
        config: &Config,
    ) -> (Result<ExitCode, LifecycleError>, String) {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let result = {
            let mut output = LifecycleOutput::new(&mut stdout, &mut stderr);
            let context = LifecycleContext {
                config,
                config_arguments: &[],
                supervisor_binary: None,
            };
            SystemLifecycle.handle(action, context, &mut output)
        };
        (result, String::from_utf8_lossy(&stdout).into_owned())
    }

    #[test]
    fn start_refuses_when_the_endpoint_is_busy() {
        let dir = TempDir::new().expect("temp dir");
        let data_dir =
            Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        let config = context_config(
            data_dir,
            ApiEndpoint::tcp(addr.ip().to_string(), addr.port()),
        );
        let (result, _) = run_action(DaemonAction::Start, &config);
        assert!(matches!(
            result,
            Err(LifecycleError::EndpointInUse { .. })
        ));
    }

    #[test]
    fn start_requires_an_initialised_node() {
        let dir = TempDir::new().expect("temp dir");
        let data_dir =
            Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
        // Port 1 on loopback is never listening in the test environment.
        let config = context_config(data_dir, ApiEndpoint::tcp("127.0.0.1", 1));
        let (result, _) = run_action(DaemonAction::Start, &config);
        assert!(matches!(
            result,
            Err(LifecycleError::Store(StoreError::NotFound { .. }))
        ));
    }

    #[test]
    fn stop_without_runtime_files_reports_not_running() {
        let dir = TempDir::new().expect("temp dir");
        let data_dir =
            Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
        let config = context_config(data_dir, ApiEndpoint::tcp("127.0.0.1", 1));
        let (result, stdout) = run_action(DaemonAction::Stop, &config);
        assert!(matches!(result, Ok(code) if code == ExitCode::SUCCESS));
        assert!(stdout.contains("daemon is not running"));
    }

    #[test]
    fn status_reports_health_snapshot_contents() {
        let dir = TempDir::new().expect("temp dir");
        let data_dir =
            Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
        let paths = RuntimePaths::from_data_dir(&data_dir).expect("paths");
        health::write_health(paths.health_path(), HealthState::Ready, 4242)
            .expect("write health");
        let config = context_config(data_dir, ApiEndpoint::tcp("127.0.0.1", 1));
        let (result, stdout) = run_action(DaemonAction::Status, &config);
        assert!(matches!(result, Ok(code) if code == ExitCode::SUCCESS));
        assert!(stdout.contains("running"));
        assert!(stdout.contains("4242"));
    }

    #[test]
    fn status_without_runtime_dir_reports_not_running() {
        let dir = TempDir::new().expect("temp dir");
        let data_dir = Utf8PathBuf::from_path_buf(dir.path().join("node")).expect("utf-8 path");
        let config = context_config(data_dir, ApiEndpoint::tcp("127.0.0.1", 1));
        let (result, stdout) = run_action(DaemonAction::Status, &config);
        assert!(matches!(result, Ok(code) if code == ExitCode::SUCCESS));
        assert!(stdout.contains("not running"));
    }
}
