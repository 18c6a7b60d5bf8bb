//! CLI entrypoint for the `agora` community node tool.
//!
//! The binary delegates to [`agora_cli::run`], which loads configuration,
//! parses the command surface, and drives the node lifecycle library.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    agora_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
