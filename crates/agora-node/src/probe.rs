//! Read-only inspection of the daemon installation and data directory.

use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::debug;

use agora_config::DEFAULT_DAEMON_BIN;

const PROBE_TARGET: &str = "agora_node::probe";

/// Environment variable overriding the daemon binary lookup.
pub const DAEMON_BIN_ENV_VAR: &str = "AGORA_DAEMON_BIN";

/// Schema number this release can safely reuse.
pub const REPO_SCHEMA_VERSION: u32 = 1;

/// Marker file inside the data directory recording the repo schema.
pub const VERSION_MARKER_FILE: &str = "version";

/// Installation state derived on each probe; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallationState {
    /// No daemon binary is available.
    Absent,
    /// The binary exists but the data directory has not been initialised.
    BinaryOnly,
    /// Binary, marker, and node configuration are all in place.
    Initialized,
    /// The data directory carries a schema this release cannot safely reuse.
    Incompatible,
}

/// Detects whether the daemon binary and an initialised data directory exist.
///
/// Purely read-only: probing never creates or mutates anything.
#[derive(Debug, Clone, Default)]
pub struct InstallationProbe {
    daemon_bin: Option<Utf8PathBuf>,
}

impl InstallationProbe {
    /// Builds a probe with an optional explicit binary override.
    #[must_use]
    pub fn new(daemon_bin: Option<Utf8PathBuf>) -> Self {
        Self { daemon_bin }
    }

    /// Resolves the daemon binary: the explicit override, then the
    /// environment variable, then a `PATH` scan for the default name.
    ///
    /// Returns `None` when no candidate points at an existing file.
    #[must_use]
    pub fn resolve_daemon_binary(&self) -> Option<PathBuf> {
        if let Some(explicit) = &self.daemon_bin {
            let path = explicit.as_std_path();
            return path.is_file().then(|| path.to_path_buf());
        }
        if let Some(from_env) = env::var_os(DAEMON_BIN_ENV_VAR) {
            let path = PathBuf::from(from_env);
            return path.is_file().then_some(path);
        }
        let search_path = env::var_os("PATH")?;
        env::split_paths(&search_path)
            .map(|entry| entry.join(DEFAULT_DAEMON_BIN))
            .find(|candidate| candidate.is_file())
    }

    /// Computes the installation state for the given data directory.
    pub fn probe(&self, data_dir: &Utf8Path) -> Result<InstallationState, ProbeError> {
        let Some(binary) = self.resolve_daemon_binary() else {
            return Ok(InstallationState::Absent);
        };
        debug!(
            target: PROBE_TARGET,
            binary = %binary.display(),
            data_dir = %data_dir,
            "daemon binary resolved"
        );

        let marker_path = data_dir.join(VERSION_MARKER_FILE);
        let marker = match fs::read_to_string(marker_path.as_std_path()) {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Ok(InstallationState::BinaryOnly);
            }
            Err(source) => {
                return Err(ProbeError::Marker {
                    path: marker_path,
                    source,
                });
            }
        };
        match marker.trim().parse::<u32>() {
            Ok(REPO_SCHEMA_VERSION) => {}
            // An unreadable or mismatched marker is never reused silently.
            Ok(_) | Err(_) => return Ok(InstallationState::Incompatible),
        }

        let config_path = data_dir.join(crate::store::NODE_CONFIG_FILE);
        if config_path.as_std_path().is_file() {
            Ok(InstallationState::Initialized)
        } else {
            Ok(InstallationState::BinaryOnly)
        }
    }
}

/// Errors raised while probing the installation.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The version marker exists but could not be read.
    #[error("failed to read version marker '{path}': {source}")]
    Marker {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}
