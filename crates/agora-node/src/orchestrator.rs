//! Composition of the lifecycle components behind the two public
//! operations: `init` and `start_daemon`.
//!
//! Setup-phase errors surface immediately and are never retried here; the
//! operator re-invokes after remediation. Runtime-phase crashes are handled
//! by the supervisor's restart policy and only escalate once the budget is
//! exhausted.

use std::time::Duration;

use thiserror::Error;
use tracing::info;

use agora_config::Config;

use crate::init::{InitError, InitRequest, NodeInitializer};
use crate::installer::Installer;
use crate::probe::{InstallationProbe, InstallationState, ProbeError};
use crate::store::{ConfigStore, NodeConfig, StoreError};
use crate::supervisor::{
    DaemonHandle, DaemonRuntime, DaemonSupervisor, RestartPolicy, StartError, StopError,
};

const ORCHESTRATOR_TARGET: &str = "agora_node::orchestrator";

/// Wires the probe, installer, initialiser, store, and supervisor together.
#[derive(Debug)]
pub struct Orchestrator<I: Installer, R: DaemonRuntime> {
    config: Config,
    store: ConfigStore,
    probe: InstallationProbe,
    installer: I,
    initializer: NodeInitializer,
    supervisor: DaemonSupervisor<R>,
}

impl<I: Installer, R: DaemonRuntime> Orchestrator<I, R> {
    /// Builds an orchestrator from the runtime configuration.
    #[must_use]
    pub fn new(config: Config, installer: I, runtime: R) -> Self {
        let store = ConfigStore::new(config.data_dir.clone());
        let probe = InstallationProbe::new(config.daemon_bin.clone());
        let initializer = NodeInitializer::new(
            config.data_dir.clone(),
            config.api_endpoint.clone(),
            config.bootstrap_peers.clone(),
        );
        let policy = RestartPolicy {
            max_restarts: config.max_restarts(),
            ..RestartPolicy::default()
        };
        let supervisor = DaemonSupervisor::new(runtime, policy);
        Self {
            config,
            store,
            probe,
            installer,
            initializer,
            supervisor,
        }
    }

    /// Idempotently initialises the community node.
    ///
    /// When the daemon binary is absent and `install_if_missing` is false,
    /// fails with [`OrchestratorError::NotInstalled`] rather than installing
    /// silently.
    pub fn init(&self, install_if_missing: bool) -> Result<NodeConfig, OrchestratorError> {
        let state = self.probe.probe(self.config.data_dir())?;
        info!(
            target: ORCHESTRATOR_TARGET,
            ?state,
            community = %self.config.community(),
            "probed installation"
        );
        if state == InstallationState::Absent && !install_if_missing {
            return Err(OrchestratorError::NotInstalled);
        }
        let request = InitRequest {
            community: self.config.community().to_string(),
            existing_identity: None,
        };
        let node = self
            .initializer
            .initialize(&self.installer, state, &request)?;
        Ok(node)
    }

    /// Starts the daemon under supervision.
    ///
    /// Requires a prior successful `init`; blocks only until the daemon is
    /// confirmed live (or start fails), after which supervision continues
    /// independently on a background thread.
    pub fn start_daemon(&self) -> Result<DaemonHandle, OrchestratorError> {
        let node = self.load_node_config()?;
        let handle = self.supervisor.start(&node)?;
        Ok(handle)
    }

    /// Gracefully stops a supervised daemon.
    pub fn stop_daemon(
        &self,
        handle: &mut DaemonHandle,
        timeout: Duration,
    ) -> Result<(), StopError> {
        self.supervisor.stop(handle, timeout)
    }

    /// The supervisor backing this orchestrator.
    #[must_use]
    pub fn supervisor(&self) -> &DaemonSupervisor<R> {
        &self.supervisor
    }

    /// Loads the persisted node configuration, mapping absence to
    /// [`OrchestratorError::NotInitialized`].
    pub fn load_node_config(&self) -> Result<NodeConfig, OrchestratorError> {
        match self.store.load() {
            Ok(node) => Ok(node),
            Err(StoreError::NotFound { path }) => Err(OrchestratorError::NotInitialized {
                path: path.to_string(),
            }),
            Err(error) => Err(error.into()),
        }
    }
}

/// Error taxonomy of the two public operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The daemon binary is missing and installation was not requested.
    #[error("the daemon is not installed; re-run init with --install-daemon")]
    NotInstalled,
    /// `start_daemon` was invoked before a successful `init`.
    #[error("node is not initialised (no configuration at '{path}'); run init first")]
    NotInitialized {
        /// Path where the configuration was expected.
        path: String,
    },
    /// Probing the installation failed.
    #[error(transparent)]
    Probe(#[from] ProbeError),
    /// Initialisation failed.
    #[error(transparent)]
    Init(#[from] InitError),
    /// Reading or writing the persisted configuration failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Starting supervision failed.
    #[error(transparent)]
    Start(#[from] StartError),
}
