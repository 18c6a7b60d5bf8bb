//! External installer boundary for the daemon binary.
//!
//! Packaging and installing the daemon is not this crate's business; the
//! installer is an external collaborator invoked with a pass/fail outcome.

use std::ffi::OsString;
use std::io;
use std::process::Command;

use thiserror::Error;
use tracing::info;

const INSTALLER_TARGET: &str = "agora_node::installer";

/// Capability to install the daemon binary.
#[cfg_attr(test, mockall::automock)]
pub trait Installer: Send + Sync {
    /// Installs the daemon, returning once the binary is available.
    fn install(&self) -> Result<(), InstallError>;
}

impl Installer for Box<dyn Installer> {
    fn install(&self) -> Result<(), InstallError> {
        (**self).install()
    }
}

/// Installer that shells out to a configured command.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: OsString,
    arguments: Vec<OsString>,
}

impl CommandInstaller {
    /// Builds an installer from a whitespace-separated command line.
    pub fn from_command_line(line: &str) -> Result<Self, InstallError> {
        let mut tokens = line.split_whitespace().map(OsString::from);
        let program = tokens.next().ok_or(InstallError::NotConfigured)?;
        Ok(Self {
            program,
            arguments: tokens.collect(),
        })
    }
}

impl Installer for CommandInstaller {
    fn install(&self) -> Result<(), InstallError> {
        info!(
            target: INSTALLER_TARGET,
            program = ?self.program,
            "invoking daemon installer"
        );
        let status = Command::new(&self.program)
            .args(&self.arguments)
            .status()
            .map_err(|source| InstallError::Launch {
                program: self.program.clone(),
                source,
            })?;
        if status.success() {
            info!(target: INSTALLER_TARGET, "daemon installer completed");
            Ok(())
        } else {
            Err(InstallError::Failed {
                program: self.program.clone(),
                exit_status: status.code(),
            })
        }
    }
}

/// Installer used when no install command is configured; always refuses.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredInstaller;

impl Installer for UnconfiguredInstaller {
    fn install(&self) -> Result<(), InstallError> {
        Err(InstallError::NotConfigured)
    }
}

/// Errors surfaced by the installer boundary. All are fatal: the operator
/// must remediate and re-invoke.
#[derive(Debug, Error)]
pub enum InstallError {
    /// No installer command was configured.
    #[error("no daemon installer is configured; set `install_command`")]
    NotConfigured,
    /// The installer process could not be launched.
    #[error("failed to launch installer '{program:?}': {source}")]
    Launch {
        program: OsString,
        #[source]
        source: io::Error,
    },
    /// The installer ran but reported failure.
    #[error("installer '{program:?}' failed (status: {exit_status:?})")]
    Failed {
        program: OsString,
        exit_status: Option<i32>,
    },
}
