//! CLI argument definitions for the `agora` tool.

use clap::{Parser, Subcommand};

/// Command-line interface for the `agora` community node tool.
#[derive(Parser, Debug)]
#[command(name = "agora", disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// The command to run.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Structured subcommands for the `agora` CLI.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Initialises the community node, optionally installing the daemon.
    Init {
        /// Install the daemon when it is not already present.
        #[arg(long = "install-daemon", visible_alias = "install-ipfs")]
        install_daemon: bool,
    },
    /// Runs daemon lifecycle commands.
    Daemon {
        /// The lifecycle action to perform.
        #[command(subcommand)]
        action: DaemonAction,
    },
}

/// Daemon lifecycle actions.
#[derive(Subcommand, Debug, Clone, Copy)]
pub(crate) enum DaemonAction {
    /// Starts the daemon under supervision and waits for readiness.
    Start,
    /// Stops the daemon gracefully.
    Stop,
    /// Prints daemon health information.
    Status,
    /// Runs the resident supervision service (spawned by `start`).
    #[command(hide = true)]
    Supervise,
}
