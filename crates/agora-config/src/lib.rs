//! Layered runtime configuration shared by the `agora` CLI and the node
//! lifecycle library.
//!
//! Values are resolved with the usual precedence: command-line flags override
//! environment variables (`AGORA_*`), which override the configuration file
//! (`agora.toml`), which overrides the built-in defaults. The persisted node
//! state (identity, bootstrap peers) is NOT part of this configuration; it is
//! owned by the node library's config store and lives inside the data
//! directory.

mod defaults;
mod endpoint;
mod logging;
mod runtime;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_API_PORT, DEFAULT_COMMUNITY, DEFAULT_DAEMON_BIN, DEFAULT_LOG_FILTER,
    DEFAULT_MAX_RESTARTS, default_api_endpoint, default_data_dir, default_log_filter,
    default_log_format,
};
pub use endpoint::{ApiEndpoint, EndpointParseError};
pub use logging::{LogFormat, LogFormatParseError};
pub use runtime::{RuntimePaths, RuntimePathsError};

/// Runtime configuration for the community node tooling.
#[derive(Debug, Clone, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "AGORA")]
pub struct Config {
    /// Directory holding the node's persisted state and runtime artefacts.
    #[serde(default = "defaults::default_data_dir")]
    pub data_dir: Utf8PathBuf,
    /// Control endpoint the daemon exposes once running.
    #[serde(default = "defaults::default_api_endpoint")]
    pub api_endpoint: ApiEndpoint,
    /// Tag of the overlay community this node participates in.
    #[serde(default = "defaults::default_community_string")]
    pub community: String,
    /// Bootstrap peer addresses overriding the built-in community seed list.
    #[serde(default)]
    pub bootstrap_peers: Option<Vec<String>>,
    /// Explicit path to the daemon binary, overriding the `PATH` lookup.
    #[serde(default)]
    pub daemon_bin: Option<Utf8PathBuf>,
    /// Command invoked to install the daemon when `init --install-daemon`
    /// finds none. Split on whitespace; the first token is the program.
    #[serde(default)]
    pub install_command: Option<String>,
    /// Log filter expression (`tracing` env-filter syntax).
    #[serde(default = "defaults::default_log_filter_string")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
    /// Maximum daemon restarts tolerated inside the sliding crash window.
    #[serde(default = "defaults::default_max_restarts")]
    pub max_restarts: u32,
}

impl Config {
    /// Control endpoint the daemon exposes once running.
    #[must_use]
    pub fn api_endpoint(&self) -> &ApiEndpoint {
        &self.api_endpoint
    }

    /// Directory holding the node's persisted state.
    #[must_use]
    pub fn data_dir(&self) -> &Utf8PathBuf {
        &self.data_dir
    }

    /// Tag of the overlay community this node participates in.
    #[must_use]
    pub fn community(&self) -> &str {
        &self.community
    }

    /// Explicit daemon binary override, when configured.
    #[must_use]
    pub fn daemon_bin(&self) -> Option<&Utf8PathBuf> {
        self.daemon_bin.as_ref()
    }

    /// Bootstrap peer override, when configured.
    #[must_use]
    pub fn bootstrap_peers(&self) -> Option<&[String]> {
        self.bootstrap_peers.as_deref()
    }

    /// Installer command, when configured.
    #[must_use]
    pub fn install_command(&self) -> Option<&str> {
        self.install_command.as_deref()
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Restart budget for the supervisor's crash policy.
    #[must_use]
    pub fn max_restarts(&self) -> u32 {
        self.max_restarts
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: defaults::default_data_dir(),
            api_endpoint: defaults::default_api_endpoint(),
            community: defaults::default_community_string(),
            bootstrap_peers: None,
            daemon_bin: None,
            install_command: None,
            log_filter: defaults::default_log_filter_string(),
            log_format: LogFormat::default(),
            max_restarts: defaults::default_max_restarts(),
        }
    }
}
