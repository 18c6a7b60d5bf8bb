//! Supervision service spawning.
//!
//! `daemon start` launches the hidden `daemon supervise` command as a
//! separate process, forwarding the configuration flags verbatim so the
//! service resolves the same data directory and endpoint.

use std::env;
use std::ffi::{OsStr, OsString};
use std::process::{Child, Command, Stdio};

use super::error::LifecycleError;
use super::types::LifecycleContext;

/// Environment variable overriding the supervisor binary, used by tests.
const SUPERVISOR_BIN_ENV_VAR: &str = "AGORA_BIN";

/// Spawns the resident supervision service.
pub(super) fn spawn_supervisor(context: LifecycleContext<'_>) -> Result<Child, LifecycleError> {
    let binary = resolve_supervisor_binary(context.supervisor_binary);
    let mut command = Command::new(&binary);
    if context.config_arguments.len() > 1 {
        // Skip argv[0], which is the binary name, and forward the remaining
        // configuration flags verbatim to the service.
        for arg in &context.config_arguments[1..] {
            command.arg(arg);
        }
    }
    command.arg("daemon").arg("supervise");
    command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    command
        .spawn()
        .map_err(|source| LifecycleError::LaunchSupervisor { binary, source })
}

fn resolve_supervisor_binary(binary_override: Option<&OsStr>) -> OsString {
    binary_override
        .map(OsString::from)
        .or_else(|| env::var_os(SUPERVISOR_BIN_ENV_VAR))
        .or_else(|| env::current_exe().ok().map(OsString::from))
        .unwrap_or_else(|| OsString::from("agora"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_config::Config;

    #[test]
    fn spawn_uses_the_binary_override() {
        let config = Config::default();
        let context = LifecycleContext {
            config: &config,
            config_arguments: &[],
            supervisor_binary: Some(OsStr::new("/test/custom/agora")),
        };
        let result = spawn_supervisor(context);
        let error = result.expect_err("missing binary must fail to spawn");
        match error {
            LifecycleError::LaunchSupervisor { binary, .. } => {
                assert_eq!(binary, OsString::from("/test/custom/agora"));
            }
            other => panic!("expected LaunchSupervisor, got: {other:?}"),
        }
    }

    #[test]
    fn resolve_prefers_the_explicit_override() {
        let resolved = resolve_supervisor_binary(Some(OsStr::new("/custom/agora")));
        assert_eq!(resolved, OsString::from("/custom/agora"));
    }

    #[test]
    fn resolve_falls_back_to_the_current_executable() {
        // Without an override, either AGORA_BIN or the running test binary
        // is used; both are absolute paths.
        let resolved = resolve_supervisor_binary(None);
        assert!(!resolved.is_empty());
    }
}
