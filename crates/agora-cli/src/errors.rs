//! Error types and exit-code mapping for the CLI runtime.
//!
//! Every remediation path in the error taxonomy gets its own stable exit
//! code so wrapping scripts can distinguish them.

use std::process::ExitCode;
use std::sync::Arc;

use thiserror::Error;

use agora_node::service::ServiceError;
use agora_node::telemetry::TelemetryError;
use agora_node::{InitError, OrchestratorError, StartError, StoreError};

use crate::lifecycle::LifecycleError;

/// Exit code: the daemon binary is not installed.
pub(crate) const EXIT_NOT_INSTALLED: u8 = 10;
/// Exit code: the external installer failed.
pub(crate) const EXIT_INSTALL_FAILED: u8 = 11;
/// Exit code: the data directory is incompatible with this release.
pub(crate) const EXIT_INCOMPATIBLE: u8 = 12;
/// Exit code: the persisted node configuration is corrupt.
pub(crate) const EXIT_CONFIG_CORRUPT: u8 = 13;
/// Exit code: the node has not been initialised.
pub(crate) const EXIT_NOT_INITIALIZED: u8 = 14;
/// Exit code: a supervisor already manages this data directory.
pub(crate) const EXIT_ALREADY_RUNNING: u8 = 15;
/// Exit code: the daemon failed to become live.
pub(crate) const EXIT_SPAWN_ERROR: u8 = 16;
/// Exit code: the restart budget was exhausted.
pub(crate) const EXIT_DAEMON_UNSTABLE: u8 = 17;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to initialise telemetry: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("daemon lifecycle command failed: {0}")]
    Lifecycle(#[from] LifecycleError),
}

impl AppError {
    /// Maps the error to its stable exit code.
    pub(crate) fn exit_code(&self) -> ExitCode {
        match self {
            Self::CliUsage(_) => ExitCode::from(2),
            Self::LoadConfiguration(_) | Self::Telemetry(_) => ExitCode::FAILURE,
            Self::Orchestrator(error) => ExitCode::from(orchestrator_code(error)),
            Self::Service(error) => ExitCode::from(service_code(error)),
            Self::Lifecycle(error) => ExitCode::from(lifecycle_code(error)),
        }
    }
}

fn orchestrator_code(error: &OrchestratorError) -> u8 {
    match error {
        OrchestratorError::NotInstalled => EXIT_NOT_INSTALLED,
        OrchestratorError::NotInitialized { .. } => EXIT_NOT_INITIALIZED,
        OrchestratorError::Init(init) => init_code(init),
        OrchestratorError::Store(store) => store_code(store),
        OrchestratorError::Start(start) => start_code(start),
        OrchestratorError::Probe(_) => 1,
    }
}

fn init_code(error: &InitError) -> u8 {
    match error {
        InitError::Install(_) => EXIT_INSTALL_FAILED,
        InitError::Incompatible { .. }
        | InitError::CommunityMismatch { .. }
        | InitError::IdentityMismatch => EXIT_INCOMPATIBLE,
        InitError::Store(store) => store_code(store),
        InitError::CreateDataDir { .. }
        | InitError::MarkerWrite { .. }
        | InitError::Cleanup { .. } => 1,
    }
}

fn store_code(error: &StoreError) -> u8 {
    match error {
        StoreError::Corrupt { .. } | StoreError::Schema { .. } => EXIT_CONFIG_CORRUPT,
        StoreError::NotFound { .. } => EXIT_NOT_INITIALIZED,
        StoreError::Read { .. } | StoreError::Serialise(_) | StoreError::Write { .. } => 1,
    }
}

fn start_code(error: &StartError) -> u8 {
    match error {
        StartError::AlreadyRunning { .. } => EXIT_ALREADY_RUNNING,
        StartError::Spawn { .. }
        | StartError::Monitor { .. }
        | StartError::EarlyExit { .. }
        | StartError::Probe { .. }
        | StartError::ProbeTimeout { .. } => EXIT_SPAWN_ERROR,
        StartError::Paths(_)
        | StartError::LockCreate { .. }
        | StartError::Cleanup { .. }
        | StartError::CheckProcess { .. }
        | StartError::PidWrite { .. }
        | StartError::MonitorThread { .. } => 1,
    }
}

fn service_code(error: &ServiceError) -> u8 {
    match error {
        ServiceError::NotInitialized { .. } => EXIT_NOT_INITIALIZED,
        ServiceError::DaemonBinaryMissing => EXIT_NOT_INSTALLED,
        ServiceError::Store(store) => store_code(store),
        ServiceError::Start(start) => start_code(start),
        ServiceError::DaemonUnstable => EXIT_DAEMON_UNSTABLE,
        ServiceError::Paths(_)
        | ServiceError::Daemonize { .. }
        | ServiceError::Health(_)
        | ServiceError::SignalThread { .. } => 1,
    }
}

fn lifecycle_code(error: &LifecycleError) -> u8 {
    match error {
        LifecycleError::EndpointInUse { .. } => EXIT_ALREADY_RUNNING,
        LifecycleError::Store(store) => store_code(store),
        // The supervise process already exited with a distinguishable
        // code; propagate it verbatim.
        LifecycleError::StartupFailed {
            exit_status: Some(code),
        } => u8::try_from(*code).unwrap_or(EXIT_SPAWN_ERROR),
        LifecycleError::StartupFailed { exit_status: None }
        | LifecycleError::StartupAborted { .. }
        | LifecycleError::StartupTimeout { .. }
        | LifecycleError::LaunchSupervisor { .. } => EXIT_SPAWN_ERROR,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(OrchestratorError::NotInstalled, EXIT_NOT_INSTALLED)]
    #[case(
        OrchestratorError::NotInitialized { path: "/tmp/node.json".to_string() },
        EXIT_NOT_INITIALIZED
    )]
    #[case(
        OrchestratorError::Start(StartError::AlreadyRunning { pid: 7 }),
        EXIT_ALREADY_RUNNING
    )]
    #[case(
        OrchestratorError::Start(StartError::EarlyExit { exit_code: Some(1) }),
        EXIT_SPAWN_ERROR
    )]
    fn orchestrator_errors_map_to_stable_codes(
        #[case] error: OrchestratorError,
        #[case] expected: u8,
    ) {
        let app_error = AppError::from(error);
        assert_eq!(app_error.exit_code(), ExitCode::from(expected));
    }

    #[test]
    fn startup_failure_propagates_the_child_exit_code() {
        let error = AppError::from(LifecycleError::StartupFailed {
            exit_status: Some(i32::from(EXIT_NOT_INITIALIZED)),
        });
        assert_eq!(error.exit_code(), ExitCode::from(EXIT_NOT_INITIALIZED));
    }

    #[test]
    fn unstable_service_maps_to_its_own_code() {
        let error = AppError::from(ServiceError::DaemonUnstable);
        assert_eq!(error.exit_code(), ExitCode::from(EXIT_DAEMON_UNSTABLE));
    }
}
