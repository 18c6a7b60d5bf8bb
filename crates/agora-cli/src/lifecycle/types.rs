//! Shared context and output abstractions for lifecycle commands.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::Write;

use agora_config::Config;

use super::LifecycleError;

/// Shared configuration context available to lifecycle handlers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LifecycleContext<'a> {
    pub(crate) config: &'a Config,
    /// Configuration flags forwarded verbatim to the supervision service.
    pub(crate) config_arguments: &'a [OsString],
    /// Test override for the supervisor binary.
    pub(crate) supervisor_binary: Option<&'a OsStr>,
}

/// Output handle abstracting over stdout/stderr writers.
pub(crate) struct LifecycleOutput<W: Write, E: Write> {
    pub(crate) stdout: W,
    pub(crate) stderr: E,
}

impl<W: Write, E: Write> LifecycleOutput<W, E> {
    pub(crate) fn new(stdout: W, stderr: E) -> Self {
        Self { stdout, stderr }
    }

    pub(crate) fn stdout_line(&mut self, args: fmt::Arguments<'_>) -> Result<(), LifecycleError> {
        self.stdout.write_fmt(args).map_err(LifecycleError::Io)?;
        self.stdout.write_all(b"\n").map_err(LifecycleError::Io)?;
        self.stdout.flush().map_err(LifecycleError::Io)
    }

    pub(crate) fn stderr_line(&mut self, args: fmt::Arguments<'_>) -> Result<(), LifecycleError> {
        self.stderr.write_fmt(args).map_err(LifecycleError::Io)?;
        self.stderr.write_all(b"\n").map_err(LifecycleError::Io)?;
        self.stderr.flush().map_err(LifecycleError::Io)
    }
}
