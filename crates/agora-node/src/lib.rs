//! Lifecycle orchestration for an `agora` community node.
//!
//! A community node is one participant in a named peer-to-peer overlay,
//! built on an external storage/transport daemon that this crate treats as
//! opaque: it is installed (via an external installer), configured through
//! filesystem state, spawned as a child process, probed over a local
//! control endpoint, and terminated with signals. The crate owns the whole
//! process-and-configuration lifecycle behind two operations:
//!
//! - [`Orchestrator::init`]: idempotent install/initialise/configure.
//! - [`Orchestrator::start_daemon`]: start and supervise the daemon,
//!   restarting on crashes within a bounded budget.
//!
//! The protocol itself, the application built on top, and the packaging of
//! the daemon binary are all out of scope.

pub mod health;
mod init;
mod installer;
mod orchestrator;
mod probe;
pub mod service;
mod store;
pub mod supervisor;
pub mod telemetry;

pub use init::{InitError, InitRequest, NodeInitializer};
pub use installer::{CommandInstaller, InstallError, Installer, UnconfiguredInstaller};
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use probe::{
    DAEMON_BIN_ENV_VAR, InstallationProbe, InstallationState, ProbeError, REPO_SCHEMA_VERSION,
};
pub use store::{ConfigStore, IdentityKey, IdentityKeyError, NodeConfig, StoreError};
pub use supervisor::{
    DaemonHandle, DaemonStatus, DaemonSupervisor, ProcessDaemonRuntime, RestartPolicy, StartError,
    StatusEvent, StatusEvents, StopError,
};
