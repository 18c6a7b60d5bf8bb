//! Resident supervision service.
//!
//! `agora daemon start` spawns this service as a separate process (via the
//! hidden `daemon supervise` command); the service detaches into the
//! background, acquires the supervision lock, starts the daemon, and keeps
//! the supervisor's monitor loop alive until a termination signal arrives
//! or the restart budget is exhausted. Health snapshots under the runtime
//! directory are how lifecycle commands observe it from the outside.

use std::env;
use std::ffi::OsStr;
use std::io;

use daemonize_me::Daemon;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::{info, warn};

use agora_config::{Config, RuntimePaths, RuntimePathsError};

use crate::health::{self, HealthError, HealthState};
use crate::store::{ConfigStore, NodeConfig, StoreError};
use crate::supervisor::guard::SupervisionLock;
use crate::supervisor::{
    DEFAULT_STOP_TIMEOUT, DaemonRuntime, DaemonSupervisor, ProcessDaemonRuntime, RestartPolicy,
    StartError, StatusEvent,
};

const SERVICE_TARGET: &str = "agora_node::service";

/// Environment variable keeping the service attached to the terminal.
pub const FOREGROUND_ENV_VAR: &str = "AGORA_FOREGROUND";

/// Launch mode for the supervision service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Fork into the background and detach from the controlling terminal.
    Background,
    /// Remain attached to the terminal; primarily used for debugging and tests.
    Foreground,
}

impl LaunchMode {
    fn detect() -> Self {
        if env::var_os(FOREGROUND_ENV_VAR).is_some() {
            Self::Foreground
        } else {
            Self::Background
        }
    }
}

/// Abstraction over daemonisation strategies.
pub trait Daemonizer {
    /// Detaches the process into the background.
    fn daemonize(&self, paths: &RuntimePaths) -> Result<(), DaemonizeError>;
}

/// Errors surfaced by the daemonisation backend.
#[derive(Debug, Error)]
pub enum DaemonizeError {
    /// System-level daemonisation failed.
    #[error("{0}")]
    System(#[from] daemonize_me::DaemonError),
}

/// Daemoniser that delegates to `daemonize-me`.
#[derive(Debug, Default)]
pub struct SystemDaemonizer;

impl Daemonizer for SystemDaemonizer {
    fn daemonize(&self, paths: &RuntimePaths) -> Result<(), DaemonizeError> {
        info!(
            target: SERVICE_TARGET,
            runtime = %paths.runtime_dir().display(),
            "daemonising into background"
        );
        let mut daemon = Daemon::new();
        daemon = daemon.work_dir(paths.runtime_dir());
        daemon = daemon.name(OsStr::new(env!("CARGO_PKG_NAME")));
        daemon.start()?;
        info!(
            target: SERVICE_TARGET,
            "supervisor process detached; continuing in child"
        );
        Ok(())
    }
}

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + 'static {
    /// Blocks until shutdown should proceed.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Shutdown listener that waits for termination signals.
#[derive(Debug, Default)]
pub struct SystemShutdownSignal;

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| ShutdownError::Install { source })?;
        if let Some(signal) = signals.forever().next() {
            info!(
                target: SERVICE_TARGET,
                signal,
                "shutdown signal received"
            );
        }
        Ok(())
    }
}

/// Process-level collaborators needed to control the service lifecycle.
pub struct ProcessControl<D, S> {
    /// Launch mode (background or foreground).
    pub mode: LaunchMode,
    /// Daemonisation backend.
    pub daemonizer: D,
    /// Shutdown notification source.
    pub shutdown: S,
}

/// Runs the supervision service with the production collaborators.
pub fn run_supervisor(config: &Config) -> Result<(), ServiceError> {
    let store = ConfigStore::new(config.data_dir.clone());
    let node = load_node(&store)?;
    let binary = crate::probe::InstallationProbe::new(config.daemon_bin.clone())
        .resolve_daemon_binary()
        .ok_or(ServiceError::DaemonBinaryMissing)?;
    let runtime = ProcessDaemonRuntime::new(binary);
    let control = ProcessControl {
        mode: LaunchMode::detect(),
        daemonizer: SystemDaemonizer,
        shutdown: SystemShutdownSignal,
    };
    run_supervisor_with(config, &node, runtime, control)
}

/// Runs the supervision service with injected collaborators.
pub fn run_supervisor_with<R, D, S>(
    config: &Config,
    node: &NodeConfig,
    runtime: R,
    control: ProcessControl<D, S>,
) -> Result<(), ServiceError>
where
    R: DaemonRuntime,
    D: Daemonizer,
    S: ShutdownSignal,
{
    let ProcessControl {
        mode,
        daemonizer,
        shutdown,
    } = control;

    info!(
        target: SERVICE_TARGET,
        ?mode,
        community = %node.community,
        "starting supervision service"
    );
    let paths = RuntimePaths::from_data_dir(&node.data_dir)?;
    // The lock is taken before detaching so a second supervisor fails fast
    // in the foreground, where the operator can still see the error.
    let lock = SupervisionLock::acquire(paths.clone())?;
    if matches!(mode, LaunchMode::Background) {
        daemonizer.daemonize(lock.paths())?;
    }
    let supervisor_pid = std::process::id();
    lock.write_pid(supervisor_pid)?;
    health::write_health(paths.health_path(), HealthState::Starting, supervisor_pid)?;

    let policy = RestartPolicy {
        max_restarts: config.max_restarts(),
        ..RestartPolicy::default()
    };
    let supervisor = DaemonSupervisor::new(runtime, policy);
    let mut handle = supervisor.start_with_lock(node, lock)?;

    let controller = handle.stop_controller();
    let signal_thread = std::thread::Builder::new()
        .name("agora-signals".to_string())
        .spawn(move || match shutdown.wait() {
            Ok(()) => controller.request_stop(DEFAULT_STOP_TIMEOUT),
            Err(error) => {
                warn!(
                    target: SERVICE_TARGET,
                    error = %error,
                    "shutdown listener failed; stopping supervision"
                );
                controller.request_stop(DEFAULT_STOP_TIMEOUT);
            }
        })
        .map_err(|source| ServiceError::SignalThread { source })?;

    let events = handle.take_events();
    let mut unstable = false;
    if let Some(events) = events {
        for event in events {
            match event {
                StatusEvent::Running { pid } => {
                    record_health(&paths, HealthState::Ready, supervisor_pid);
                    info!(target: SERVICE_TARGET, pid, "daemon is live");
                }
                StatusEvent::Stopping => {
                    record_health(&paths, HealthState::Stopping, supervisor_pid);
                }
                StatusEvent::Unstable => {
                    unstable = true;
                }
                StatusEvent::Stopped => break,
                _ => {}
            }
        }
    }
    if let Some(join) = handle.monitor.take() {
        let _ = join.join();
    }
    // A Stopping snapshot written after the monitor removed its artefacts
    // would otherwise linger as a stale file.
    let _ = std::fs::remove_file(paths.health_path());
    drop(signal_thread);
    info!(
        target: SERVICE_TARGET,
        unstable,
        "supervision service finished"
    );
    if unstable {
        Err(ServiceError::DaemonUnstable)
    } else {
        Ok(())
    }
}

fn load_node(store: &ConfigStore) -> Result<NodeConfig, ServiceError> {
    match store.load() {
        Ok(node) => Ok(node),
        Err(StoreError::NotFound { path }) => Err(ServiceError::NotInitialized {
            path: path.to_string(),
        }),
        Err(error) => Err(error.into()),
    }
}

fn record_health(paths: &RuntimePaths, state: HealthState, pid: u32) {
    if let Err(error) = health::write_health(paths.health_path(), state, pid) {
        warn!(
            target: SERVICE_TARGET,
            error = %error,
            "failed to update health snapshot"
        );
    }
}

/// Errors surfaced while running the supervision service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No node configuration exists yet.
    #[error("node is not initialised (no configuration at '{path}'); run init first")]
    NotInitialized {
        /// Path where the configuration was expected.
        path: String,
    },
    /// The daemon binary disappeared between init and start.
    #[error("daemon binary not found; re-run init")]
    DaemonBinaryMissing,
    /// Reading the persisted configuration failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Deriving runtime paths failed.
    #[error(transparent)]
    Paths(#[from] RuntimePathsError),
    /// Starting supervision failed.
    #[error(transparent)]
    Start(#[from] StartError),
    /// Daemonisation failed.
    #[error("failed to daemonise: {source}")]
    Daemonize {
        /// Underlying daemonisation error.
        #[from]
        source: DaemonizeError,
    },
    /// Writing the initial health snapshot failed.
    #[error(transparent)]
    Health(#[from] HealthError),
    /// The signal listener thread could not be spawned.
    #[error("failed to spawn signal listener: {source}")]
    SignalThread {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The restart budget was exhausted.
    #[error("daemon is unstable: restart budget exhausted")]
    DaemonUnstable,
}
