//! Error surface of the daemon supervisor.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use agora_config::RuntimePathsError;

/// Errors raised while starting supervision.
#[derive(Debug, Error)]
pub enum StartError {
    /// Deriving runtime paths failed.
    #[error(transparent)]
    Paths(#[from] RuntimePathsError),
    /// Lock file creation failed.
    #[error("failed to create lock file '{path}': {source}")]
    LockCreate {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Another supervisor already holds the per-data-dir lock.
    #[error("a supervisor is already running for this data directory (pid {pid})")]
    AlreadyRunning {
        /// PID recorded by the existing supervisor.
        pid: u32,
    },
    /// Removing a stale runtime artefact failed.
    #[error("failed to remove stale file '{path}': {source}")]
    Cleanup {
        /// Path of the artefact that could not be removed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Probing an existing PID failed.
    #[error("failed to check existing process {pid}: {source}")]
    CheckProcess {
        /// PID that failed to probe.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Writing the PID file failed.
    #[error("failed to write pid file '{path}': {source}")]
    PidWrite {
        /// PID file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Spawning the daemon process failed.
    #[error("failed to spawn daemon process: {source}")]
    Spawn {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Polling the spawned process failed.
    #[error("failed to monitor daemon launch: {source}")]
    Monitor {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The daemon exited before answering its liveness probe.
    #[error("daemon exited before becoming live (status: {exit_code:?})")]
    EarlyExit {
        /// Exit code of the failed process.
        exit_code: Option<i32>,
    },
    /// The liveness probe itself failed.
    #[error("failed to probe daemon endpoint {endpoint}: {source}")]
    Probe {
        /// Endpoint that was probed.
        endpoint: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The daemon never answered its probe inside the startup budget.
    #[error("daemon did not become live on {endpoint} within {timeout_ms} ms")]
    ProbeTimeout {
        /// Endpoint that was probed.
        endpoint: String,
        /// Startup budget in milliseconds.
        timeout_ms: u64,
    },
    /// The monitor thread could not be spawned.
    #[error("failed to spawn supervision thread: {source}")]
    MonitorThread {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Errors raised while stopping supervision.
#[derive(Debug, Error)]
pub enum StopError {
    /// The monitor thread panicked before confirming the stop.
    #[error("supervision thread panicked during shutdown")]
    MonitorPanicked,
}
