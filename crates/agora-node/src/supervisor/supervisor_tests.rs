//! Behavioural tests for the supervisor, driven by a scripted stub daemon.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::Utf8PathBuf;
use tempfile::TempDir;

use agora_config::ApiEndpoint;

use super::monitor::RestartPolicy;
use super::runtime::{DaemonExit, DaemonProcess, DaemonRuntime};
use super::{DaemonStatus, DaemonSupervisor, StartError, StatusEvent};
use crate::store::{IdentityKey, NodeConfig};

#[derive(Debug)]
struct StubShared {
    /// Spawns that will go live and then exit shortly afterwards.
    crashes_remaining: u32,
    /// Probe attempts each fresh process ignores before answering.
    probes_before_live: u32,
    probes_remaining: u32,
    current_alive: bool,
    spawn_count: u32,
    /// When set, the first spawn exits before ever answering a probe.
    immediate_exit: bool,
}

/// Daemon stub whose spawn/probe/exit behaviour is scripted per test.
#[derive(Debug, Clone)]
pub(crate) struct StubRuntime {
    shared: Arc<Mutex<StubShared>>,
}

impl StubRuntime {
    pub(crate) fn new(crashes: u32, probes_before_live: u32) -> Self {
        Self {
            shared: Arc::new(Mutex::new(StubShared {
                crashes_remaining: crashes,
                probes_before_live,
                probes_remaining: 0,
                current_alive: false,
                spawn_count: 0,
                immediate_exit: false,
            })),
        }
    }

    pub(crate) fn with_immediate_exit() -> Self {
        let runtime = Self::new(0, 0);
        runtime.lock().immediate_exit = true;
        runtime
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubShared> {
        self.shared.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    pub(crate) fn spawn_count(&self) -> u32 {
        self.lock().spawn_count
    }
}

impl DaemonRuntime for StubRuntime {
    type Process = StubProcess;

    fn spawn(&self, _config: &NodeConfig) -> io::Result<StubProcess> {
        let mut shared = self.lock();
        shared.spawn_count += 1;
        let polls_before_exit = if shared.immediate_exit {
            shared.immediate_exit = false;
            Some(1)
        } else if shared.crashes_remaining > 0 {
            shared.crashes_remaining -= 1;
            // The first poll happens during the readiness wait; the second
            // comes from the monitor loop and observes the exit.
            Some(2)
        } else {
            None
        };
        shared.probes_remaining = shared.probes_before_live;
        shared.current_alive = true;
        Ok(StubProcess {
            pid: 1000 + shared.spawn_count,
            polls: 0,
            polls_before_exit,
            killed: false,
            shared: Arc::clone(&self.shared),
        })
    }

    fn probe(&self, _endpoint: &ApiEndpoint) -> io::Result<bool> {
        let mut shared = self.lock();
        if !shared.current_alive {
            return Ok(false);
        }
        if shared.probes_remaining > 0 {
            shared.probes_remaining -= 1;
            return Ok(false);
        }
        Ok(true)
    }
}

#[derive(Debug)]
pub(crate) struct StubProcess {
    pid: u32,
    polls: u32,
    polls_before_exit: Option<u32>,
    killed: bool,
    shared: Arc<Mutex<StubShared>>,
}

impl StubProcess {
    fn mark_dead(&self) {
        self.shared
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .current_alive = false;
    }
}

impl DaemonProcess for StubProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn poll_exit(&mut self) -> io::Result<Option<DaemonExit>> {
        if self.killed {
            self.mark_dead();
            return Ok(Some(DaemonExit {
                exit_code: None,
                success: false,
            }));
        }
        if let Some(limit) = self.polls_before_exit {
            self.polls += 1;
            if self.polls >= limit {
                self.mark_dead();
                return Ok(Some(DaemonExit {
                    exit_code: Some(9),
                    success: false,
                }));
            }
        }
        Ok(None)
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.killed = true;
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.killed = true;
        Ok(())
    }
}

struct Fixture {
    _dir: TempDir,
    config: NodeConfig,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().expect("temp dir");
    let data_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
    let config = NodeConfig {
        identity_key: IdentityKey::generate(),
        data_dir,
        bootstrap_peers: Vec::new(),
        community: "agora".to_string(),
        api_endpoint: ApiEndpoint::tcp("127.0.0.1", 5001),
    };
    Fixture { _dir: dir, config }
}

/// Fast policy so crash-restart tests finish in well under a second.
fn fast_policy(max_restarts: u32) -> RestartPolicy {
    RestartPolicy {
        max_restarts,
        restart_window: Duration::from_secs(60),
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(40),
    }
}

const STOP_TIMEOUT: Duration = Duration::from_secs(2);

#[test]
fn start_reaches_running_after_delayed_probe() {
    let fixture = fixture();
    let runtime = StubRuntime::new(0, 2);
    let supervisor = DaemonSupervisor::new(runtime.clone(), fast_policy(5));
    let mut handle = supervisor.start(&fixture.config).expect("start");
    assert_eq!(handle.status(), DaemonStatus::Running);
    assert_eq!(runtime.spawn_count(), 1);
    supervisor.stop(&mut handle, STOP_TIMEOUT).expect("stop");
    assert_eq!(handle.status(), DaemonStatus::Stopped);
}

#[test]
fn crashes_below_budget_recover_with_nondecreasing_delays() {
    let fixture = fixture();
    let runtime = StubRuntime::new(3, 0);
    let supervisor = DaemonSupervisor::new(runtime.clone(), fast_policy(5));
    let mut handle = supervisor.start(&fixture.config).expect("start");
    let events = supervisor.monitor(&mut handle).expect("event stream");

    let mut delays = Vec::new();
    let mut runs = 0;
    for event in events {
        match event {
            StatusEvent::Restarting { delay, .. } => delays.push(delay),
            StatusEvent::Running { .. } => {
                runs += 1;
                // Initial run plus one per crash.
                if runs == 4 {
                    break;
                }
            }
            StatusEvent::Unstable => panic!("budget must not be exhausted"),
            _ => {}
        }
    }
    assert_eq!(delays.len(), 3);
    assert!(
        delays.windows(2).all(|pair| pair[0] <= pair[1]),
        "restart delays must be non-decreasing: {delays:?}"
    );
    assert_eq!(handle.restart_count(), 3);
    supervisor.stop(&mut handle, STOP_TIMEOUT).expect("stop");
}

#[test]
fn crashes_at_budget_surface_unstable_and_stop() {
    let fixture = fixture();
    let runtime = StubRuntime::new(10, 0);
    let supervisor = DaemonSupervisor::new(runtime.clone(), fast_policy(3));
    let mut handle = supervisor.start(&fixture.config).expect("start");
    let events = supervisor.monitor(&mut handle).expect("event stream");

    let collected: Vec<StatusEvent> = events.collect();
    assert!(collected.contains(&StatusEvent::Unstable));
    assert_eq!(collected.last(), Some(&StatusEvent::Stopped));
    assert_eq!(handle.status(), DaemonStatus::Stopped);
    // Budget of three crashes allows the initial spawn plus two respawns.
    assert_eq!(runtime.spawn_count(), 3);

    // The lock must be free again once supervision gave up.
    let paths =
        agora_config::RuntimePaths::from_data_dir_readonly(&fixture.config.data_dir);
    assert!(!paths.lock_path().exists());
}

#[test]
fn stop_releases_the_lock_for_an_immediate_restart() {
    let fixture = fixture();
    let supervisor = DaemonSupervisor::new(StubRuntime::new(0, 0), fast_policy(5));
    let mut handle = supervisor.start(&fixture.config).expect("first start");
    supervisor.stop(&mut handle, STOP_TIMEOUT).expect("stop");

    let second = DaemonSupervisor::new(StubRuntime::new(0, 0), fast_policy(5));
    let mut handle = second.start(&fixture.config).expect("start after stop");
    second.stop(&mut handle, STOP_TIMEOUT).expect("second stop");
}

#[test]
fn concurrent_starts_yield_one_running_and_one_already_running() {
    let fixture = fixture();
    let supervisor = DaemonSupervisor::new(StubRuntime::new(0, 0), fast_policy(5));
    let rival = DaemonSupervisor::new(StubRuntime::new(0, 0), fast_policy(5));

    let mut handle = supervisor.start(&fixture.config).expect("first start");
    let error = rival
        .start(&fixture.config)
        .expect_err("second start must fail fast");
    assert!(matches!(error, StartError::AlreadyRunning { .. }));
    assert_eq!(handle.status(), DaemonStatus::Running);
    supervisor.stop(&mut handle, STOP_TIMEOUT).expect("stop");
}

#[test]
fn stop_during_restart_backoff_cancels_the_respawn() {
    let fixture = fixture();
    let runtime = StubRuntime::new(100, 0);
    let policy = RestartPolicy {
        max_restarts: 50,
        restart_window: Duration::from_secs(60),
        // Long enough that the stop request always lands mid-backoff.
        initial_backoff: Duration::from_secs(30),
        max_backoff: Duration::from_secs(30),
    };
    let supervisor = DaemonSupervisor::new(runtime.clone(), policy);
    let mut handle = supervisor.start(&fixture.config).expect("start");
    let events = supervisor.monitor(&mut handle).expect("event stream");

    // Wait for the crash and the scheduled restart.
    let mut saw_restarting = false;
    let mut remaining = Vec::new();
    for event in events {
        if matches!(event, StatusEvent::Restarting { .. }) {
            saw_restarting = true;
            supervisor
                .stop(&mut handle, STOP_TIMEOUT)
                .expect("stop during backoff");
        } else if saw_restarting {
            remaining.push(event);
        }
    }
    assert!(saw_restarting, "daemon never entered restart backoff");
    assert_eq!(remaining.last(), Some(&StatusEvent::Stopped));
    assert!(
        !remaining
            .iter()
            .any(|event| matches!(event, StatusEvent::Starting | StatusEvent::Running { .. })),
        "no respawn may happen after a stop request: {remaining:?}"
    );
    // Only the initial spawn ever happened.
    assert_eq!(runtime.spawn_count(), 1);
}

#[test]
fn early_exit_before_liveness_fails_start_and_releases_lock() {
    let fixture = fixture();
    let runtime = StubRuntime::with_immediate_exit();
    let supervisor = DaemonSupervisor::new(runtime, fast_policy(5));
    let error = supervisor
        .start(&fixture.config)
        .expect_err("start must fail");
    assert!(matches!(
        error,
        StartError::EarlyExit {
            exit_code: Some(9)
        }
    ));
    let paths =
        agora_config::RuntimePaths::from_data_dir_readonly(&fixture.config.data_dir);
    assert!(!paths.lock_path().exists(), "failed start must release the lock");
}

#[test]
fn event_stream_is_ordered_and_non_restartable() {
    let fixture = fixture();
    let runtime = StubRuntime::new(1, 0);
    let supervisor = DaemonSupervisor::new(runtime, fast_policy(5));
    let mut handle = supervisor.start(&fixture.config).expect("start");
    let events = supervisor.monitor(&mut handle).expect("event stream");
    assert!(
        supervisor.monitor(&mut handle).is_none(),
        "the event stream must not be restartable"
    );

    let mut collected = Vec::new();
    let mut runs = 0;
    for event in events {
        if matches!(event, StatusEvent::Running { .. }) {
            runs += 1;
        }
        collected.push(event);
        if runs == 2 {
            break;
        }
    }
    let shape: Vec<&'static str> = collected
        .iter()
        .map(|event| match event {
            StatusEvent::Starting => "starting",
            StatusEvent::Running { .. } => "running",
            StatusEvent::Crashed { .. } => "crashed",
            StatusEvent::Restarting { .. } => "restarting",
            StatusEvent::Unstable => "unstable",
            StatusEvent::Stopping => "stopping",
            StatusEvent::Stopped => "stopped",
        })
        .collect();
    assert_eq!(
        shape,
        vec![
            "starting",
            "running",
            "crashed",
            "restarting",
            "starting",
            "running"
        ]
    );
    supervisor.stop(&mut handle, STOP_TIMEOUT).expect("stop");
}
