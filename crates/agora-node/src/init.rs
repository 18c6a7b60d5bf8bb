//! Idempotent node initialisation.
//!
//! Creates the data directory, generates or imports the node identity,
//! resolves the community's bootstrap seed list, and persists the node
//! configuration. Re-running against an initialised node is a no-op that
//! returns the stored configuration; the identity key is never regenerated
//! implicitly.

use std::fs;
use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use agora_config::ApiEndpoint;

use crate::installer::{InstallError, Installer};
use crate::probe::{InstallationState, REPO_SCHEMA_VERSION, VERSION_MARKER_FILE};
use crate::store::{ConfigStore, IdentityKey, NodeConfig, StoreError};

const INIT_TARGET: &str = "agora_node::init";

/// Built-in bootstrap seed lists keyed by community tag.
///
/// Communities not listed here fall back to an empty seed list; the node can
/// still join through a configured peer override.
const COMMUNITY_SEEDS: &[(&str, &[&str])] = &[
    (
        "agora",
        &[
            "/dnsaddr/seed0.agora.community/p2p/12D3KooWBhvJMZp6aszPcJdV2JfnMGowFHVWBMqNQas2XGoNmnTf",
            "/dnsaddr/seed1.agora.community/p2p/12D3KooWLRPJAvXnYVDMCAkU9jsHBHDAnNdTd7jVE4g1vZ9cFTzW",
            "/dnsaddr/seed2.agora.community/p2p/12D3KooWQYhTNQdmr3ArTeUHRYzFg94BKyTkoWBDWez9kSCVe2Xo",
        ],
    ),
    (
        "agora-staging",
        &[
            "/dns4/staging.agora.community/tcp/4001/p2p/12D3KooWDpJ7As7BWAwRMfu1VU2WCqNjvq387JEYKDBj4kx6nXTN",
        ],
    ),
];

fn community_seeds(community: &str) -> Option<&'static [&'static str]> {
    COMMUNITY_SEEDS
        .iter()
        .find(|(tag, _)| *tag == community)
        .map(|(_, seeds)| *seeds)
}

/// Parameters for one initialisation run.
#[derive(Debug, Clone)]
pub struct InitRequest {
    /// Tag of the community to join.
    pub community: String,
    /// Identity to import instead of generating a fresh one.
    pub existing_identity: Option<IdentityKey>,
}

/// Performs idempotent, resumable node initialisation.
#[derive(Debug)]
pub struct NodeInitializer {
    store: ConfigStore,
    data_dir: Utf8PathBuf,
    api_endpoint: ApiEndpoint,
    bootstrap_override: Option<Vec<String>>,
}

impl NodeInitializer {
    /// Builds an initialiser for the given data directory.
    #[must_use]
    pub fn new(
        data_dir: Utf8PathBuf,
        api_endpoint: ApiEndpoint,
        bootstrap_override: Option<Vec<String>>,
    ) -> Self {
        Self {
            store: ConfigStore::new(data_dir.clone()),
            data_dir,
            api_endpoint,
            bootstrap_override,
        }
    }

    /// Initialises the node for the probed installation state.
    ///
    /// `Absent` delegates to the installer first; `Incompatible` fails
    /// rather than migrating; `Initialized` is a no-op returning the stored
    /// configuration.
    pub fn initialize(
        &self,
        installer: &dyn Installer,
        state: InstallationState,
        request: &InitRequest,
    ) -> Result<NodeConfig, InitError> {
        match state {
            InstallationState::Incompatible => Err(InitError::Incompatible {
                data_dir: self.data_dir.clone(),
            }),
            InstallationState::Initialized => self.reuse_existing(request),
            InstallationState::Absent => {
                installer.install()?;
                self.create(request)
            }
            InstallationState::BinaryOnly => self.create(request),
        }
    }

    /// Destructively re-initialises the node, discarding the stored identity.
    ///
    /// This is the only path that replaces an existing identity key.
    pub fn reinitialize(&self, request: &InitRequest) -> Result<NodeConfig, InitError> {
        for stale in [
            self.store.path(),
            self.data_dir.join(VERSION_MARKER_FILE),
        ] {
            match fs::remove_file(stale.as_std_path()) {
                Ok(()) => {}
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(InitError::Cleanup {
                        path: stale,
                        source,
                    });
                }
            }
        }
        warn!(
            target: INIT_TARGET,
            data_dir = %self.data_dir,
            "discarded existing node state for re-initialisation"
        );
        self.create(request)
    }

    fn reuse_existing(&self, request: &InitRequest) -> Result<NodeConfig, InitError> {
        let stored = self.store.load()?;
        if stored.community != request.community {
            return Err(InitError::CommunityMismatch {
                requested: request.community.clone(),
                stored: stored.community,
            });
        }
        if let Some(imported) = &request.existing_identity
            && imported != &stored.identity_key
        {
            return Err(InitError::IdentityMismatch);
        }
        info!(
            target: INIT_TARGET,
            community = %stored.community,
            "node already initialised; keeping existing configuration"
        );
        Ok(stored)
    }

    fn create(&self, request: &InitRequest) -> Result<NodeConfig, InitError> {
        fs::create_dir_all(self.data_dir.as_std_path()).map_err(|source| {
            InitError::CreateDataDir {
                path: self.data_dir.clone(),
                source,
            }
        })?;

        // A previous run may have persisted the configuration without
        // completing the marker; resume with the identity it recorded.
        let identity_key = match self.store.load() {
            Ok(previous) => previous.identity_key,
            Err(StoreError::NotFound { .. }) => match &request.existing_identity {
                Some(imported) => imported.clone(),
                None => {
                    info!(target: INIT_TARGET, "generated new node identity");
                    IdentityKey::generate()
                }
            },
            Err(error) => return Err(error.into()),
        };

        let bootstrap_peers = self.resolve_bootstrap_peers(&request.community);
        let config = NodeConfig {
            identity_key,
            data_dir: self.data_dir.clone(),
            bootstrap_peers,
            community: request.community.clone(),
            api_endpoint: self.api_endpoint.clone(),
        };
        self.store.save(&config)?;

        // The marker is written last so an interrupted run stays resumable.
        let marker_path = self.data_dir.join(VERSION_MARKER_FILE);
        fs::write(
            marker_path.as_std_path(),
            format!("{REPO_SCHEMA_VERSION}\n"),
        )
        .map_err(|source| InitError::MarkerWrite {
            path: marker_path,
            source,
        })?;

        info!(
            target: INIT_TARGET,
            community = %config.community,
            peers = config.bootstrap_peers.len(),
            data_dir = %self.data_dir,
            "community node initialised"
        );
        Ok(config)
    }

    fn resolve_bootstrap_peers(&self, community: &str) -> Vec<String> {
        if let Some(peers) = &self.bootstrap_override {
            return peers.clone();
        }
        match community_seeds(community) {
            Some(seeds) => seeds.iter().map(|seed| (*seed).to_string()).collect(),
            None => {
                warn!(
                    target: INIT_TARGET,
                    community,
                    "no built-in seeds for community; configure bootstrap_peers to join"
                );
                Vec::new()
            }
        }
    }
}

/// Errors raised during node initialisation. None are retried here; the
/// operator re-invokes after remediation.
#[derive(Debug, Error)]
pub enum InitError {
    /// The data directory could not be created.
    #[error("failed to create data directory '{path}': {source}")]
    CreateDataDir {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// The external installer failed; fatal, never retried automatically.
    #[error(transparent)]
    Install(#[from] InstallError),
    /// The data directory carries state this release cannot safely reuse.
    #[error(
        "data directory '{data_dir}' is incompatible with this release; re-initialise explicitly"
    )]
    Incompatible { data_dir: Utf8PathBuf },
    /// The version marker could not be written.
    #[error("failed to write version marker '{path}': {source}")]
    MarkerWrite {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// Removing stale state during re-initialisation failed.
    #[error("failed to remove stale file '{path}': {source}")]
    Cleanup {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// The persisted configuration could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The node is already initialised for a different community.
    #[error("node is initialised for community '{stored}', not '{requested}'")]
    CommunityMismatch { requested: String, stored: String },
    /// An imported identity conflicts with the stored one.
    #[error("supplied identity does not match the stored node identity")]
    IdentityMismatch,
}
