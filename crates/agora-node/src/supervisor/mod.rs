//! Resilient supervision of the external daemon process.
//!
//! This module is split into focused submodules so each concern remains
//! small and testable:
//! - [`runtime`] defines the capability boundary to the opaque daemon.
//! - [`guard`] owns the per-data-directory supervision lock.
//! - [`handle`] holds the handle, status, and event-stream types.
//! - [`liveness`] probes the daemon's control endpoint.
//! - [`monitor`] runs the background crash-restart loop.
//! - [`control`] implements the start/stop/monitor entry points.

mod control;
mod errors;
pub(crate) mod guard;
mod handle;
pub mod liveness;
mod monitor;
mod runtime;

#[cfg(test)]
pub(crate) mod supervisor_tests;

pub use control::{DEFAULT_STOP_TIMEOUT, DaemonSupervisor};
pub use errors::{StartError, StopError};
pub use handle::{DaemonHandle, DaemonStatus, StatusEvent, StatusEvents, StopController};
pub use monitor::RestartPolicy;
pub use runtime::{DaemonExit, DaemonProcess, DaemonRuntime, ProcessDaemonRuntime, SpawnedDaemon};

pub(crate) const SUPERVISOR_TARGET: &str = "agora_node::supervisor";
