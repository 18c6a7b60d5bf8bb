//! Derives runtime artefact paths shared by the CLI and the supervisor.
//!
//! The runtime directory houses the supervisor lock and pid files. Every
//! process that supervises a given data directory needs to agree on the
//! layout so lifecycle commands can interact with the files written by an
//! earlier supervisor instance.

use std::fs;
use std::path::{Path, PathBuf};

use camino::Utf8Path;
use thiserror::Error;

/// Canonical paths for runtime artefacts written by the supervisor.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    runtime_dir: PathBuf,
    lock_path: PathBuf,
    pid_path: PathBuf,
    health_path: PathBuf,
}

impl RuntimePaths {
    /// Derives runtime paths beneath the node's data directory, creating the
    /// runtime directory when absent.
    pub fn from_data_dir(data_dir: &Utf8Path) -> Result<Self, RuntimePathsError> {
        let runtime_dir = data_dir.as_std_path().join("run");
        fs::create_dir_all(&runtime_dir).map_err(|source| RuntimePathsError::RuntimeDirectory {
            path: runtime_dir.clone(),
            source,
        })?;
        Ok(Self {
            lock_path: runtime_dir.join("agora.lock"),
            pid_path: runtime_dir.join("agora.pid"),
            health_path: runtime_dir.join("agora.health"),
            runtime_dir,
        })
    }

    /// Derives runtime paths without creating the directory.
    ///
    /// Used by read-only commands (`daemon status`) that must not leave
    /// artefacts behind on a node that was never started.
    #[must_use]
    pub fn from_data_dir_readonly(data_dir: &Utf8Path) -> Self {
        let runtime_dir = data_dir.as_std_path().join("run");
        Self {
            lock_path: runtime_dir.join("agora.lock"),
            pid_path: runtime_dir.join("agora.pid"),
            health_path: runtime_dir.join("agora.health"),
            runtime_dir,
        }
    }

    /// Directory holding runtime artefacts.
    pub fn runtime_dir(&self) -> &Path {
        self.runtime_dir.as_path()
    }

    /// Path to the lock file guarding singleton supervision.
    pub fn lock_path(&self) -> &Path {
        self.lock_path.as_path()
    }

    /// Path to the PID file.
    pub fn pid_path(&self) -> &Path {
        self.pid_path.as_path()
    }

    /// Path to the health snapshot.
    pub fn health_path(&self) -> &Path {
        self.health_path.as_path()
    }
}

/// Errors raised while deriving supervisor runtime paths.
#[derive(Debug, Error)]
pub enum RuntimePathsError {
    /// Creating the runtime directory failed.
    #[error("failed to prepare runtime directory '{path}': {source}")]
    RuntimeDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
