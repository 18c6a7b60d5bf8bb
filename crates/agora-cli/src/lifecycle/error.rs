//! Error types for daemon lifecycle operations.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use agora_config::RuntimePathsError;
use agora_node::StoreError;
use agora_node::health::HealthError;

/// Errors raised while executing lifecycle commands.
#[derive(Debug, Error)]
pub(crate) enum LifecycleError {
    #[error(
        "daemon endpoint {endpoint} is already in use; stop the existing daemon or change --api-endpoint"
    )]
    EndpointInUse { endpoint: String },
    #[error("failed to probe daemon endpoint {endpoint}: {source}")]
    EndpointProbe {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to launch supervisor binary '{binary:?}': {source}")]
    LaunchSupervisor {
        binary: OsString,
        #[source]
        source: io::Error,
    },
    #[error("supervisor exited before reporting ready (status: {exit_status:?})")]
    StartupFailed { exit_status: Option<i32> },
    #[error("daemon reported 'stopping' before reaching ready; check health snapshot at {path:?}")]
    StartupAborted { path: PathBuf },
    #[error("timed out waiting for ready snapshot in {timeout_ms} ms at {health_path:?}")]
    StartupTimeout {
        health_path: PathBuf,
        timeout_ms: u64,
    },
    #[error("failed to monitor supervisor launch: {source}")]
    MonitorChild {
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Health(#[from] HealthError),
    #[error("failed to read pid file {path:?}: {source}")]
    ReadPid {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse pid file {path:?}: {source}")]
    ParsePid {
        path: PathBuf,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error(
        "daemon endpoint {endpoint} is reachable but pid file {path:?} is missing; inspect the runtime directory before retrying"
    )]
    MissingPidWithEndpoint { path: PathBuf, endpoint: String },
    #[error("failed to write lifecycle output: {0}")]
    Io(#[source] io::Error),
    #[error("failed to signal supervisor pid {pid}: {source}")]
    SignalFailed {
        pid: u32,
        #[source]
        source: io::Error,
    },
    #[error("daemon shutdown did not complete within {timeout_ms} ms; check {pid_path:?}")]
    ShutdownTimeout { pid_path: PathBuf, timeout_ms: u64 },
    #[cfg(not(unix))]
    #[error("platform does not support daemon lifecycle signalling")]
    UnsupportedPlatform,
    #[error(transparent)]
    Paths(#[from] RuntimePathsError),
}
