//! Health snapshots bridging the supervisor and lifecycle commands.
//!
//! The resident supervisor writes a small JSON snapshot (`agora.health`)
//! whenever its state changes; `daemon start` polls it to confirm readiness
//! and `daemon status` reads it to report. The timestamp lets readers tell a
//! fresh snapshot from one left behind by an earlier run.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current operational state of the supervised node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Supervisor is bringing the daemon up.
    Starting,
    /// Daemon answered its liveness probe and is being supervised.
    Ready,
    /// Supervisor is shutting the daemon down.
    Stopping,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => formatter.write_str("starting"),
            Self::Ready => formatter.write_str("ready"),
            Self::Stopping => formatter.write_str("stopping"),
        }
    }
}

/// Snapshot persisted by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Current supervision state.
    pub status: HealthState,
    /// PID of the supervisor process.
    pub pid: u32,
    /// Seconds since the epoch when the snapshot was written.
    pub timestamp: u64,
}

impl HealthSnapshot {
    /// Builds a snapshot stamped with the current time.
    pub fn now(status: HealthState, pid: u32) -> Result<Self, HealthError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|source| HealthError::Clock { source })?
            .as_secs();
        Ok(Self {
            status,
            pid,
            timestamp,
        })
    }
}

/// Writes the snapshot, truncating any previous one.
pub fn write_health(path: &Path, status: HealthState, pid: u32) -> Result<(), HealthError> {
    let snapshot = HealthSnapshot::now(status, pid)?;
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).map_err(|source| HealthError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::to_writer(&mut file, &snapshot).map_err(HealthError::Serialise)?;
    file.write_all(b"\n").map_err(|source| HealthError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    file.sync_all().map_err(|source| HealthError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Reads the snapshot, returning `None` when it has not been written yet.
pub fn read_health(path: &Path) -> Result<Option<HealthSnapshot>, HealthError> {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| HealthError::Parse {
                path: path.to_path_buf(),
                source,
            }),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(HealthError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Errors raised while reading or writing health snapshots.
#[derive(Debug, Error)]
pub enum HealthError {
    /// Reading the snapshot failed.
    #[error("failed to read health snapshot {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The snapshot exists but contains invalid JSON.
    #[error("failed to parse health snapshot {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// Writing the snapshot failed.
    #[error("failed to write health snapshot {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Serialising the snapshot failed.
    #[error("failed to serialise health snapshot: {0}")]
    Serialise(#[source] serde_json::Error),
    /// Obtaining the current timestamp failed.
    #[error("failed to read system time: {source}")]
    Clock {
        #[source]
        source: SystemTimeError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_snapshot_reads_as_none() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("agora.health");
        assert_eq!(read_health(&path).expect("read"), None);
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("agora.health");
        write_health(&path, HealthState::Ready, 42).expect("write");
        let snapshot = read_health(&path).expect("read").expect("snapshot present");
        assert_eq!(snapshot.status, HealthState::Ready);
        assert_eq!(snapshot.pid, 42);
        assert!(snapshot.timestamp > 0);
    }

    #[test]
    fn rewrites_replace_previous_state() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("agora.health");
        write_health(&path, HealthState::Starting, 7).expect("write starting");
        write_health(&path, HealthState::Stopping, 7).expect("write stopping");
        let snapshot = read_health(&path).expect("read").expect("snapshot present");
        assert_eq!(snapshot.status, HealthState::Stopping);
    }

    #[test]
    fn garbage_snapshot_is_a_parse_error() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("agora.health");
        std::fs::write(&path, b"{oops").expect("write garbage");
        assert!(matches!(
            read_health(&path),
            Err(HealthError::Parse { .. })
        ));
    }
}
