//! Health snapshot polling and PID reading.

use std::fs;
use std::io;
use std::path::Path;
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use agora_config::RuntimePaths;
use agora_node::health::{self, HealthSnapshot, HealthState};

use super::error::LifecycleError;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Waits for the supervision service to report ready within the timeout.
///
/// The spawned process detaches into the background and exits cleanly once
/// forked, so readiness is observed through the health snapshot alone; the
/// timestamp distinguishes a fresh snapshot from one left by an earlier
/// run. A non-zero exit of the spawned process fails the startup with its
/// exit code.
pub(super) fn wait_for_ready(
    paths: &RuntimePaths,
    child: &mut Child,
    started_at: SystemTime,
    timeout: Duration,
) -> Result<HealthSnapshot, LifecycleError> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(status) = child
            .try_wait()
            .map_err(|source| LifecycleError::MonitorChild { source })?
            && !status.success()
        {
            return Err(LifecycleError::StartupFailed {
                exit_status: status.code(),
            });
        }
        if let Some(snapshot) = health::read_health(paths.health_path())?
            && snapshot_is_recent(&snapshot, started_at)?
        {
            match snapshot.status {
                HealthState::Ready => return Ok(snapshot),
                HealthState::Stopping => {
                    return Err(LifecycleError::StartupAborted {
                        path: paths.health_path().to_path_buf(),
                    });
                }
                HealthState::Starting => {}
            }
        }
        thread::sleep(POLL_INTERVAL);
    }
    Err(LifecycleError::StartupTimeout {
        health_path: paths.health_path().to_path_buf(),
        timeout_ms: timeout.as_millis() as u64,
    })
}

/// Reads the supervisor PID file, returning `None` when absent or empty.
pub(super) fn read_pid(path: &Path) -> Result<Option<u32>, LifecycleError> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let trimmed = content.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<u32>()
                .map(Some)
                .map_err(|source| LifecycleError::ParsePid {
                    path: path.to_path_buf(),
                    source,
                })
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LifecycleError::ReadPid {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn snapshot_is_recent(
    snapshot: &HealthSnapshot,
    started_at: SystemTime,
) -> Result<bool, LifecycleError> {
    // Truncate started_at to seconds since the snapshot has no sub-second
    // precision; a snapshot written in the same second must count as fresh.
    let started_secs = started_at
        .duration_since(UNIX_EPOCH)
        .map_err(|_| LifecycleError::MonitorChild {
            source: io::Error::other("system clock before unix epoch"),
        })?
        .as_secs();
    Ok(snapshot.timestamp >= started_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn temp_paths() -> (TempDir, RuntimePaths) {
        let dir = TempDir::new().expect("temp dir");
        let data_dir =
            Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
        let paths = RuntimePaths::from_data_dir(&data_dir).expect("paths");
        (dir, paths)
    }

    #[test]
    fn read_pid_handles_missing_file() {
        let (_dir, paths) = temp_paths();
        assert_eq!(read_pid(paths.pid_path()).expect("read"), None);
    }

    #[test]
    fn read_pid_parses_integer() {
        let (_dir, paths) = temp_paths();
        fs::write(paths.pid_path(), b"42\n").expect("write pid");
        assert_eq!(read_pid(paths.pid_path()).expect("read"), Some(42));
    }

    #[test]
    fn read_pid_rejects_garbage() {
        let (_dir, paths) = temp_paths();
        fs::write(paths.pid_path(), b"not-a-pid\n").expect("write pid");
        assert!(matches!(
            read_pid(paths.pid_path()),
            Err(LifecycleError::ParsePid { .. })
        ));
    }

    #[test]
    fn snapshot_freshness_requires_recent_timestamp() {
        let snapshot = HealthSnapshot {
            status: HealthState::Ready,
            pid: 1,
            timestamp: 10,
        };
        let late = UNIX_EPOCH + Duration::from_secs(20);
        assert!(!snapshot_is_recent(&snapshot, late).expect("recency"));
        let early = UNIX_EPOCH + Duration::from_secs(5);
        assert!(snapshot_is_recent(&snapshot, early).expect("recency"));
    }

    #[test]
    fn snapshot_written_in_the_same_second_counts_as_fresh() {
        let now = SystemTime::now();
        let secs = now
            .duration_since(UNIX_EPOCH)
            .expect("after epoch")
            .as_secs();
        let snapshot = HealthSnapshot {
            status: HealthState::Ready,
            pid: 1,
            timestamp: secs,
        };
        assert!(snapshot_is_recent(&snapshot, now).expect("recency"));
    }
}
