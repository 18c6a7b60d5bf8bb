//! Supervisor shutdown utilities.
//!
//! `daemon stop` signals the resident supervisor, which terminates the
//! daemon gracefully and removes its runtime artefacts; completion is
//! observed by polling for the PID file to disappear and the endpoint to
//! go quiet.

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use agora_config::{ApiEndpoint, RuntimePaths};
use agora_node::supervisor::liveness::endpoint_is_reachable;

use super::error::LifecycleError;

#[cfg(unix)]
use libc::{SIGTERM, kill};

// The supervisor itself allows the daemon 10s before escalating; give the
// whole sequence a little slack on top.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(15);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Waits for the supervisor to finish shutting down.
pub(super) fn wait_for_shutdown(
    paths: &RuntimePaths,
    endpoint: &ApiEndpoint,
) -> Result<(), LifecycleError> {
    let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
    while Instant::now() < deadline {
        let pid_exists = paths.pid_path().exists();
        let endpoint_busy = probe_endpoint(endpoint)?;
        if !pid_exists && !endpoint_busy {
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }
    Err(LifecycleError::ShutdownTimeout {
        pid_path: paths.pid_path().to_path_buf(),
        timeout_ms: SHUTDOWN_TIMEOUT.as_millis() as u64,
    })
}

pub(super) fn probe_endpoint(endpoint: &ApiEndpoint) -> Result<bool, LifecycleError> {
    endpoint_is_reachable(endpoint).map_err(|source| LifecycleError::EndpointProbe {
        endpoint: endpoint.to_string(),
        source,
    })
}

/// Sends SIGTERM to the supervisor process.
pub(super) fn signal_supervisor(pid: u32) -> Result<(), LifecycleError> {
    #[cfg(unix)]
    {
        // SAFETY: `kill(2)` is memory-safe even when the PID is invalid; the
        // kernel simply returns an error. We only translate the integer and
        // use the standard SIGTERM signal.
        let result = unsafe { kill(pid as libc::pid_t, SIGTERM) };
        if result == 0 {
            Ok(())
        } else {
            Err(LifecycleError::SignalFailed {
                pid,
                source: io::Error::last_os_error(),
            })
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(LifecycleError::UnsupportedPlatform)
    }
}
