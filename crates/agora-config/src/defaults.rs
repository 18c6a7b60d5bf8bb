use camino::Utf8PathBuf;
use std::env;

use crate::endpoint::ApiEndpoint;

/// Default TCP port the daemon's control API listens on.
pub const DEFAULT_API_PORT: u16 = 5001;

/// Default binary name of the supervised daemon, resolved on `PATH`.
pub const DEFAULT_DAEMON_BIN: &str = "ipfs";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default community tag joined when none is configured.
pub const DEFAULT_COMMUNITY: &str = "agora";

/// Default maximum daemon restarts inside the sliding crash window.
pub const DEFAULT_MAX_RESTARTS: u32 = 5;

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Owned community tag value used where allocation is required (e.g. serde).
pub fn default_community_string() -> String {
    DEFAULT_COMMUNITY.to_string()
}

/// Default restart budget used by serde when the field is absent.
pub fn default_max_restarts() -> u32 {
    DEFAULT_MAX_RESTARTS
}

/// Computes the default node data directory.
///
/// The node keeps its persisted configuration, identity, and runtime
/// artefacts under a single per-user directory.
pub fn default_data_dir() -> Utf8PathBuf {
    home_base_directory().join(".agora")
}

/// Computes the default control endpoint for the daemon.
pub fn default_api_endpoint() -> ApiEndpoint {
    ApiEndpoint::tcp("127.0.0.1", DEFAULT_API_PORT)
}

#[cfg(unix)]
fn home_base_directory() -> Utf8PathBuf {
    dirs::home_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(fallback_base_directory)
}

#[cfg(not(unix))]
fn home_base_directory() -> Utf8PathBuf {
    fallback_base_directory()
}

fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}
