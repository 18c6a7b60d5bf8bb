//! Capability-typed boundary to the external daemon.
//!
//! The daemon is opaque: the supervisor only ever spawns it, probes its
//! control endpoint, and terminates it. Modelling those three capabilities
//! as traits lets tests substitute a scripted stub for the real process.

use std::ffi::OsString;
use std::io;
use std::process::{Child, Command, Stdio};

use tracing::debug;

use agora_config::ApiEndpoint;

use super::SUPERVISOR_TARGET;
use super::liveness::endpoint_is_reachable;
use crate::store::NodeConfig;

/// Exit outcome of a supervised daemon process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonExit {
    /// Exit code, when the process exited normally.
    pub exit_code: Option<i32>,
    /// Whether the exit status was successful.
    pub success: bool,
}

/// A spawned daemon process under supervision.
pub trait DaemonProcess: Send + 'static {
    /// OS process id.
    fn pid(&self) -> u32;

    /// Non-blocking exit check; `None` while the process is still running.
    fn poll_exit(&mut self) -> io::Result<Option<DaemonExit>>;

    /// Requests graceful termination.
    fn terminate(&mut self) -> io::Result<()>;

    /// Forcefully kills the process.
    fn kill(&mut self) -> io::Result<()>;
}

/// Spawns and probes daemon processes.
pub trait DaemonRuntime: Send + Sync + 'static {
    /// Concrete process type produced by `spawn`.
    type Process: DaemonProcess;

    /// Spawns the daemon for the given node configuration.
    fn spawn(&self, config: &NodeConfig) -> io::Result<Self::Process>;

    /// Probes the control endpoint for liveness.
    fn probe(&self, endpoint: &ApiEndpoint) -> io::Result<bool>;
}

/// Production runtime that launches the real daemon binary.
#[derive(Debug, Clone)]
pub struct ProcessDaemonRuntime {
    binary: OsString,
}

impl ProcessDaemonRuntime {
    /// Builds a runtime around the resolved daemon binary.
    #[must_use]
    pub fn new(binary: impl Into<OsString>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl DaemonRuntime for ProcessDaemonRuntime {
    type Process = SpawnedDaemon;

    fn spawn(&self, config: &NodeConfig) -> io::Result<SpawnedDaemon> {
        let repo_dir = config.data_dir.join("daemon");
        let mut command = Command::new(&self.binary);
        command
            .arg("daemon")
            .env("IPFS_PATH", repo_dir.as_std_path())
            // Daemon output is forwarded verbatim, never interpreted.
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        let child = command.spawn()?;
        debug!(
            target: SUPERVISOR_TARGET,
            binary = ?self.binary,
            pid = child.id(),
            "daemon process spawned"
        );
        Ok(SpawnedDaemon { child })
    }

    fn probe(&self, endpoint: &ApiEndpoint) -> io::Result<bool> {
        endpoint_is_reachable(endpoint)
    }
}

/// Real OS process handle produced by [`ProcessDaemonRuntime`].
#[derive(Debug)]
pub struct SpawnedDaemon {
    child: Child,
}

impl DaemonProcess for SpawnedDaemon {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn poll_exit(&mut self) -> io::Result<Option<DaemonExit>> {
        Ok(self.child.try_wait()?.map(|status| DaemonExit {
            exit_code: status.code(),
            success: status.success(),
        }))
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        match kill(Pid::from_raw(self.child.id() as i32), Signal::SIGTERM) {
            Ok(()) => Ok(()),
            // Already gone; the monitor's next poll observes the exit.
            Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(io::Error::from_raw_os_error(errno as i32)),
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.kill()
    }
}
