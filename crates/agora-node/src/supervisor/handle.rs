//! Handle and state types shared between the supervisor and its callers.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, mpsc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

/// Supervision state of the daemon process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    /// No process is being supervised.
    Stopped,
    /// A process was spawned and is being brought up.
    Starting,
    /// The daemon answered its liveness probe and is healthy.
    Running,
    /// The daemon exited unexpectedly.
    Crashed,
    /// A graceful stop is in progress.
    Stopping,
}

impl std::fmt::Display for DaemonStatus {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => formatter.write_str("stopped"),
            Self::Starting => formatter.write_str("starting"),
            Self::Running => formatter.write_str("running"),
            Self::Crashed => formatter.write_str("crashed"),
            Self::Stopping => formatter.write_str("stopping"),
        }
    }
}

/// State transition delivered to observers, in strict order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// A daemon process is being brought up.
    Starting,
    /// The daemon answered its liveness probe.
    Running {
        /// PID of the live daemon process.
        pid: u32,
    },
    /// The daemon exited unexpectedly.
    Crashed {
        /// Exit code, when the process exited normally.
        exit_code: Option<i32>,
    },
    /// A restart was scheduled after a crash.
    Restarting {
        /// Restart attempt number since the last healthy run.
        attempt: u32,
        /// Backoff delay before the respawn.
        delay: Duration,
    },
    /// The restart budget was exhausted; supervision has given up.
    Unstable,
    /// A graceful stop is in progress.
    Stopping,
    /// Supervision ended and the lock was released.
    Stopped,
}

/// Pending stop request carrying the graceful-termination budget.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StopRequest {
    pub(crate) timeout: Duration,
}

/// Stop flag the monitor loop checks between polls and during backoff waits.
#[derive(Debug, Default)]
pub(crate) struct StopSignal {
    request: Mutex<Option<StopRequest>>,
    condvar: Condvar,
}

impl StopSignal {
    /// Requests a stop; the first request's timeout wins.
    pub(crate) fn request(&self, timeout: Duration) {
        let mut guard = self
            .request
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        if guard.is_none() {
            *guard = Some(StopRequest { timeout });
        }
        self.condvar.notify_all();
    }

    /// Returns the pending request, if any, without waiting.
    pub(crate) fn pending(&self) -> Option<StopRequest> {
        *self
            .request
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Waits up to `duration`, returning early with the request when a stop
    /// arrives. A pending restart must observe the stop before respawning,
    /// so backoff waits go through here rather than a plain sleep.
    pub(crate) fn wait_timeout(&self, duration: Duration) -> Option<StopRequest> {
        let deadline = Instant::now() + duration;
        let mut guard = self
            .request
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        loop {
            if let Some(request) = *guard {
                return Some(request);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (next, _) = self
                .condvar
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(|poison| poison.into_inner());
            guard = next;
        }
    }
}

/// State shared between the monitor thread and handle accessors.
#[derive(Debug)]
pub(crate) struct SupervisedState {
    status: Mutex<DaemonStatus>,
    pid: Mutex<Option<u32>>,
    restart_count: AtomicU32,
    pub(crate) stop: StopSignal,
}

impl SupervisedState {
    pub(crate) fn new() -> Self {
        Self {
            status: Mutex::new(DaemonStatus::Stopped),
            pid: Mutex::new(None),
            restart_count: AtomicU32::new(0),
            stop: StopSignal::default(),
        }
    }

    pub(crate) fn status(&self) -> DaemonStatus {
        *self
            .status
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    pub(crate) fn set_status(&self, status: DaemonStatus) {
        *self
            .status
            .lock()
            .unwrap_or_else(|poison| poison.into_inner()) = status;
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        *self
            .pid
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    pub(crate) fn set_pid(&self, pid: Option<u32>) {
        *self
            .pid
            .lock()
            .unwrap_or_else(|poison| poison.into_inner()) = pid;
    }

    pub(crate) fn restart_count(&self) -> u32 {
        self.restart_count.load(Ordering::Relaxed)
    }

    pub(crate) fn record_restart(&self) {
        self.restart_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Handle to one supervised daemon process instance.
///
/// Owned by the caller of `start`; destroyed once the stop is confirmed.
#[derive(Debug)]
pub struct DaemonHandle {
    pub(crate) state: Arc<SupervisedState>,
    pub(crate) started_at: SystemTime,
    pub(crate) events: Option<mpsc::Receiver<StatusEvent>>,
    pub(crate) monitor: Option<JoinHandle<()>>,
}

impl DaemonHandle {
    /// Current supervision status.
    #[must_use]
    pub fn status(&self) -> DaemonStatus {
        self.state.status()
    }

    /// PID of the live daemon process, when one exists.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.state.pid()
    }

    /// Number of restarts performed over this handle's lifetime.
    #[must_use]
    pub fn restart_count(&self) -> u32 {
        self.state.restart_count()
    }

    /// When supervision began.
    #[must_use]
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Takes the lazy status-event stream.
    ///
    /// The stream is infinite while supervision runs and non-restartable:
    /// the first caller owns it, later calls return `None`.
    pub fn take_events(&mut self) -> Option<StatusEvents> {
        self.events
            .take()
            .map(|receiver| StatusEvents { receiver })
    }

    /// A cloneable controller that can request a stop from another thread.
    #[must_use]
    pub fn stop_controller(&self) -> StopController {
        StopController {
            state: Arc::clone(&self.state),
        }
    }
}

/// Requests a graceful stop without borrowing the handle.
#[derive(Debug, Clone)]
pub struct StopController {
    state: Arc<SupervisedState>,
}

impl StopController {
    /// Requests a graceful stop with the given termination budget.
    pub fn request_stop(&self, timeout: Duration) {
        self.state.stop.request(timeout);
    }
}

/// Lazy iterator over [`StatusEvent`] transitions for one handle.
///
/// Blocks on `next` until the next transition; ends once supervision stops.
#[derive(Debug)]
pub struct StatusEvents {
    receiver: mpsc::Receiver<StatusEvent>,
}

impl Iterator for StatusEvents {
    type Item = StatusEvent;

    fn next(&mut self) -> Option<StatusEvent> {
        self.receiver.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn stop_signal_interrupts_a_wait() {
        let signal = Arc::new(StopSignal::default());
        let waiter = Arc::clone(&signal);
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(50));
        signal.request(Duration::from_secs(1));
        let request = handle.join().expect("waiter thread");
        assert_eq!(
            request.map(|r| r.timeout),
            Some(Duration::from_secs(1))
        );
    }

    #[test]
    fn stop_signal_times_out_quietly() {
        let signal = StopSignal::default();
        assert!(signal.wait_timeout(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn first_stop_request_wins() {
        let signal = StopSignal::default();
        signal.request(Duration::from_secs(3));
        signal.request(Duration::from_secs(9));
        let pending = signal.pending().expect("request pending");
        assert_eq!(pending.timeout, Duration::from_secs(3));
    }
}
