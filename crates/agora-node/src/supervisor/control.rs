//! Supervisor entry points: start, stop, and the readiness wait.

use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use tracing::info;

use agora_config::{ApiEndpoint, RuntimePaths};

use super::SUPERVISOR_TARGET;
use super::errors::{StartError, StopError};
use super::guard::SupervisionLock;
use super::handle::{
    DaemonHandle, DaemonStatus, StatusEvent, StatusEvents, StopRequest, SupervisedState,
};
use super::monitor::{MonitorLoop, RestartPolicy};
use super::runtime::{DaemonProcess, DaemonRuntime};
use crate::store::NodeConfig;

/// Total budget for the daemon to answer its first liveness probe.
pub(crate) const STARTUP_BUDGET: Duration = Duration::from_secs(10);
/// First delay between liveness probes; doubles up to the ceiling.
const INITIAL_PROBE_DELAY: Duration = Duration::from_millis(100);
const MAX_PROBE_DELAY: Duration = Duration::from_millis(1600);
/// Interval at which the monitor loop polls a healthy process.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Default graceful-stop budget before escalation.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Supervises one daemon process per data directory.
#[derive(Debug)]
pub struct DaemonSupervisor<R: DaemonRuntime> {
    runtime: Arc<R>,
    policy: RestartPolicy,
}

impl<R: DaemonRuntime> DaemonSupervisor<R> {
    /// Builds a supervisor around the given daemon runtime.
    #[must_use]
    pub fn new(runtime: R, policy: RestartPolicy) -> Self {
        Self {
            runtime: Arc::new(runtime),
            policy,
        }
    }

    /// Starts supervision: acquires the per-data-dir lock, spawns the
    /// daemon, and blocks until it answers its liveness probe or the
    /// startup budget runs out.
    ///
    /// Fails fast with [`StartError::AlreadyRunning`] when another
    /// supervisor holds the lock. On every error path the lock is released
    /// before returning.
    pub fn start(&self, config: &NodeConfig) -> Result<DaemonHandle, StartError> {
        let paths = RuntimePaths::from_data_dir(&config.data_dir)?;
        let lock = SupervisionLock::acquire(paths)?;
        lock.write_pid(std::process::id())?;
        self.start_with_lock(config, lock)
    }

    /// Starts supervision with a lock the caller already holds.
    ///
    /// Used by the resident service, which must acquire the lock before
    /// detaching into the background.
    pub(crate) fn start_with_lock(
        &self,
        config: &NodeConfig,
        lock: SupervisionLock,
    ) -> Result<DaemonHandle, StartError> {
        let (sender, receiver) = mpsc::channel();
        let state = Arc::new(SupervisedState::new());
        state.set_status(DaemonStatus::Starting);
        let _ = sender.send(StatusEvent::Starting);

        let mut process = self
            .runtime
            .spawn(config)
            .map_err(|source| StartError::Spawn { source })?;
        let pid = process.pid();
        state.set_pid(Some(pid));

        match wait_until_ready(self.runtime.as_ref(), &mut process, &config.api_endpoint, None)
        {
            Ok(Readiness::Ready) => {}
            // No handle exists yet, so no stop can be pending.
            Ok(Readiness::StopRequested(_)) => {}
            Err(error) => {
                if !matches!(error, StartError::EarlyExit { .. }) {
                    let _ = process.kill();
                }
                return Err(error);
            }
        }
        state.set_status(DaemonStatus::Running);
        let _ = sender.send(StatusEvent::Running { pid });
        info!(
            target: SUPERVISOR_TARGET,
            pid,
            endpoint = %config.api_endpoint,
            "daemon is live; supervision begins"
        );

        let monitor = MonitorLoop {
            runtime: Arc::clone(&self.runtime),
            config: config.clone(),
            policy: self.policy.clone(),
            state: Arc::clone(&state),
            events: sender,
            lock,
            process,
        };
        let join = thread::Builder::new()
            .name("agora-supervisor".to_string())
            .spawn(move || monitor.run())
            .map_err(|source| StartError::MonitorThread { source })?;

        Ok(DaemonHandle {
            state,
            started_at: SystemTime::now(),
            events: Some(receiver),
            monitor: Some(join),
        })
    }

    /// Requests a graceful stop and waits for supervision to end.
    ///
    /// Safe to call while a restart backoff is in flight: the pending
    /// restart observes the request before respawning. The lock is
    /// released by the monitor thread on every exit path.
    pub fn stop(&self, handle: &mut DaemonHandle, timeout: Duration) -> Result<(), StopError> {
        handle.state.stop.request(timeout);
        if let Some(join) = handle.monitor.take() {
            join.join().map_err(|_| StopError::MonitorPanicked)?;
        }
        Ok(())
    }

    /// Takes the handle's lazy status-event stream.
    pub fn monitor(&self, handle: &mut DaemonHandle) -> Option<StatusEvents> {
        handle.take_events()
    }
}

/// Outcome of a readiness wait.
pub(crate) enum Readiness {
    /// The daemon answered its probe.
    Ready,
    /// A stop request arrived before the daemon became live.
    StopRequested(StopRequest),
}

/// Polls the control endpoint with doubling delays until the daemon
/// answers, exits, or the startup budget runs out.
pub(crate) fn wait_until_ready<R: DaemonRuntime>(
    runtime: &R,
    process: &mut R::Process,
    endpoint: &ApiEndpoint,
    stop: Option<&super::handle::StopSignal>,
) -> Result<Readiness, StartError> {
    let deadline = Instant::now() + STARTUP_BUDGET;
    let mut delay = INITIAL_PROBE_DELAY;
    loop {
        if let Some(exit) = process
            .poll_exit()
            .map_err(|source| StartError::Monitor { source })?
        {
            return Err(StartError::EarlyExit {
                exit_code: exit.exit_code,
            });
        }
        match runtime.probe(endpoint) {
            Ok(true) => return Ok(Readiness::Ready),
            Ok(false) => {}
            Err(source) => {
                return Err(StartError::Probe {
                    endpoint: endpoint.to_string(),
                    source,
                });
            }
        }
        if Instant::now() + delay > deadline {
            return Err(StartError::ProbeTimeout {
                endpoint: endpoint.to_string(),
                timeout_ms: STARTUP_BUDGET.as_millis() as u64,
            });
        }
        match stop {
            Some(signal) => {
                if let Some(request) = signal.wait_timeout(delay) {
                    return Ok(Readiness::StopRequested(request));
                }
            }
            None => thread::sleep(delay),
        }
        delay = delay.saturating_mul(2).min(MAX_PROBE_DELAY);
    }
}
