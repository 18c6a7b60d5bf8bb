//! Background supervision loop.
//!
//! One monitor thread owns the daemon process, the supervision lock, and
//! the event sender for the handle's status stream. Every state transition
//! is emitted from this single thread, which keeps the stream strictly
//! ordered. The loop ends when a stop is requested or the restart budget is
//! exhausted; the lock is released when the thread drops it, on every exit
//! path including panics.

use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use super::SUPERVISOR_TARGET;
use super::control::{POLL_INTERVAL, Readiness, wait_until_ready};
use super::guard::SupervisionLock;
use super::handle::{DaemonStatus, StatusEvent, StopRequest, SupervisedState};
use super::runtime::{DaemonExit, DaemonProcess, DaemonRuntime};
use crate::store::NodeConfig;

/// Crash policy knobs for the supervision loop.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// Crashes tolerated inside the sliding window before giving up.
    pub max_restarts: u32,
    /// Width of the sliding crash window.
    pub restart_window: Duration,
    /// First backoff delay; doubles per consecutive attempt.
    pub initial_backoff: Duration,
    /// Ceiling for the doubling backoff.
    pub max_backoff: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            restart_window: Duration::from_secs(60),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RestartPolicy {
    /// Delay before restart `attempt` (1-based): 1s, 2s, 4s... capped.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10);
        let factor = 1u32 << exponent;
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Sliding record of recent crash instants.
#[derive(Debug, Default)]
struct CrashWindow {
    instants: Vec<Instant>,
}

impl CrashWindow {
    fn record(&mut self, now: Instant, width: Duration) {
        self.instants.push(now);
        self.instants
            .retain(|instant| now.duration_since(*instant) <= width);
    }

    fn count(&self) -> usize {
        self.instants.len()
    }
}

pub(crate) struct MonitorLoop<R: DaemonRuntime> {
    pub(crate) runtime: Arc<R>,
    pub(crate) config: NodeConfig,
    pub(crate) policy: RestartPolicy,
    pub(crate) state: Arc<SupervisedState>,
    pub(crate) events: Sender<StatusEvent>,
    pub(crate) lock: SupervisionLock,
    pub(crate) process: R::Process,
}

enum Watch {
    StopRequested(StopRequest),
    Exited(DaemonExit),
}

enum Respawn {
    /// The daemon is live again.
    Ready,
    /// The attempt failed; a dead process is left for the next loop turn.
    Failed,
    /// A stop request won the race; supervision has ended.
    Stopped,
}

impl<R: DaemonRuntime> MonitorLoop<R> {
    pub(crate) fn run(mut self) {
        let mut window = CrashWindow::default();
        let mut attempt: u32 = 0;
        loop {
            match self.watch_process() {
                Watch::StopRequested(request) => {
                    self.graceful_stop(request.timeout);
                    return;
                }
                Watch::Exited(exit) => {
                    self.note_crash(&exit, &mut window);
                    if window.count() >= self.policy.max_restarts as usize {
                        error!(
                            target: SUPERVISOR_TARGET,
                            crashes = window.count(),
                            window_secs = self.policy.restart_window.as_secs(),
                            "restart budget exhausted; giving up on the daemon"
                        );
                        self.emit(StatusEvent::Unstable);
                        self.finish();
                        return;
                    }
                    attempt += 1;
                    let delay = self.policy.backoff_delay(attempt);
                    info!(
                        target: SUPERVISOR_TARGET,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "scheduling daemon restart"
                    );
                    self.emit(StatusEvent::Restarting { attempt, delay });
                    // The backoff wait is stop-aware: a stop request during
                    // the delay wins over the pending respawn.
                    if self.state.stop.wait_timeout(delay).is_some() {
                        self.emit(StatusEvent::Stopping);
                        self.state.set_status(DaemonStatus::Stopping);
                        self.finish();
                        return;
                    }
                    match self.respawn() {
                        Respawn::Ready => attempt = 0,
                        // The dead process left in place feeds the next
                        // loop turn straight back into crash handling.
                        Respawn::Failed => {}
                        Respawn::Stopped => return,
                    }
                }
            }
        }
    }

    /// Polls the live process for exit and the stop flag, blocking in short
    /// stop-aware intervals.
    fn watch_process(&mut self) -> Watch {
        loop {
            match self.process.poll_exit() {
                Ok(Some(exit)) => return Watch::Exited(exit),
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        target: SUPERVISOR_TARGET,
                        error = %error,
                        "failed to poll daemon process; treating as crashed"
                    );
                    return Watch::Exited(DaemonExit {
                        exit_code: None,
                        success: false,
                    });
                }
            }
            if let Some(request) = self.state.stop.wait_timeout(POLL_INTERVAL) {
                return Watch::StopRequested(request);
            }
        }
    }

    fn note_crash(&mut self, exit: &DaemonExit, window: &mut CrashWindow) {
        warn!(
            target: SUPERVISOR_TARGET,
            exit_code = ?exit.exit_code,
            "daemon exited unexpectedly"
        );
        self.state.set_pid(None);
        self.state.set_status(DaemonStatus::Crashed);
        self.emit(StatusEvent::Crashed {
            exit_code: exit.exit_code,
        });
        window.record(Instant::now(), self.policy.restart_window);
    }

    /// Respawns the daemon and waits for liveness.
    ///
    /// Failures leave a dead process in `self.process` so the next loop
    /// turn observes the exit and applies the crash policy; no crash is
    /// recorded here.
    fn respawn(&mut self) -> Respawn {
        self.state.set_status(DaemonStatus::Starting);
        self.emit(StatusEvent::Starting);
        self.state.record_restart();
        let mut process = match self.runtime.spawn(&self.config) {
            Ok(process) => process,
            Err(error) => {
                warn!(
                    target: SUPERVISOR_TARGET,
                    error = %error,
                    "daemon respawn failed"
                );
                return Respawn::Failed;
            }
        };
        let pid = process.pid();
        self.state.set_pid(Some(pid));
        match wait_until_ready(
            self.runtime.as_ref(),
            &mut process,
            &self.config.api_endpoint,
            Some(&self.state.stop),
        ) {
            Ok(Readiness::Ready) => {
                self.process = process;
                self.state.set_status(DaemonStatus::Running);
                self.emit(StatusEvent::Running { pid });
                info!(
                    target: SUPERVISOR_TARGET,
                    pid,
                    "daemon restarted and live"
                );
                Respawn::Ready
            }
            Ok(Readiness::StopRequested(request)) => {
                // Stop won the race; hand the fresh process to shutdown.
                self.process = process;
                self.graceful_stop(request.timeout);
                Respawn::Stopped
            }
            Err(error) => {
                warn!(
                    target: SUPERVISOR_TARGET,
                    pid,
                    error = %error,
                    "respawned daemon never became live"
                );
                if let Err(kill_error) = process.kill() {
                    warn!(
                        target: SUPERVISOR_TARGET,
                        pid,
                        error = %kill_error,
                        "failed to kill unresponsive daemon"
                    );
                }
                let _ = reap(&mut process, Duration::from_secs(2));
                self.process = process;
                Respawn::Failed
            }
        }
    }

    fn graceful_stop(&mut self, timeout: Duration) {
        self.state.set_status(DaemonStatus::Stopping);
        self.emit(StatusEvent::Stopping);
        if let Err(error) = self.process.terminate() {
            warn!(
                target: SUPERVISOR_TARGET,
                error = %error,
                "failed to signal daemon; escalating immediately"
            );
        }
        if reap(&mut self.process, timeout).is_none() {
            warn!(
                target: SUPERVISOR_TARGET,
                timeout_ms = timeout.as_millis() as u64,
                "daemon ignored graceful stop; killing"
            );
            if let Err(error) = self.process.kill() {
                warn!(
                    target: SUPERVISOR_TARGET,
                    error = %error,
                    "failed to kill daemon process"
                );
            }
            let _ = reap(&mut self.process, Duration::from_secs(2));
        }
        info!(target: SUPERVISOR_TARGET, "daemon stopped");
        self.finish();
    }

    // The lock is released when `self` drops at the end of `run`.
    fn finish(&mut self) {
        self.state.set_pid(None);
        self.state.set_status(DaemonStatus::Stopped);
        self.emit(StatusEvent::Stopped);
    }

    fn emit(&self, event: StatusEvent) {
        // The receiver may have been dropped by an uninterested caller;
        // supervision continues regardless.
        let _ = self.events.send(event);
    }
}

/// Polls the process until it exits, up to `timeout`.
fn reap<P: DaemonProcess>(process: &mut P, timeout: Duration) -> Option<DaemonExit> {
    let deadline = Instant::now() + timeout;
    loop {
        match process.poll_exit() {
            Ok(Some(exit)) => return Some(exit),
            Ok(None) => {}
            Err(_) => return None,
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, Duration::from_secs(1))]
    #[case(2, Duration::from_secs(2))]
    #[case(3, Duration::from_secs(4))]
    #[case(6, Duration::from_secs(30))]
    #[case(20, Duration::from_secs(30))]
    fn backoff_doubles_up_to_the_cap(#[case] attempt: u32, #[case] expected: Duration) {
        let policy = RestartPolicy::default();
        assert_eq!(policy.backoff_delay(attempt), expected);
    }

    #[test]
    fn backoff_delays_never_decrease() {
        let policy = RestartPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 1..=12 {
            let delay = policy.backoff_delay(attempt);
            assert!(delay >= previous, "delay shrank at attempt {attempt}");
            previous = delay;
        }
    }

    #[test]
    fn crash_window_drops_old_entries() {
        let mut window = CrashWindow::default();
        let base = Instant::now();
        window.record(base, Duration::from_secs(60));
        window.record(base + Duration::from_secs(120), Duration::from_secs(60));
        assert_eq!(window.count(), 1);
    }

    #[test]
    fn crash_window_keeps_entries_inside_the_window() {
        let mut window = CrashWindow::default();
        let base = Instant::now();
        for offset in 0..4 {
            window.record(base + Duration::from_secs(offset), Duration::from_secs(60));
        }
        assert_eq!(window.count(), 4);
    }
}
