//! Per-data-directory supervision lock.
//!
//! The lock file is the sole arbiter preventing two supervisors from
//! managing the same daemon. Creation uses `create_new` semantics; an
//! existing lock is honoured only while the recorded supervisor PID is
//! still alive, otherwise the stale artefacts are cleaned and the lock is
//! re-acquired.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use tracing::{info, warn};

use agora_config::RuntimePaths;

use super::SUPERVISOR_TARGET;
use super::errors::StartError;

#[derive(Debug)]
pub(crate) struct SupervisionLock {
    paths: RuntimePaths,
    _lock: File,
}

impl SupervisionLock {
    pub(crate) fn acquire(paths: RuntimePaths) -> Result<Self, StartError> {
        let lock = acquire_lock(&paths)?;
        Ok(Self {
            paths,
            _lock: lock,
        })
    }

    /// Records the supervisor's own PID so a later `stop` knows whom to
    /// signal and a stale lock can be detected.
    pub(crate) fn write_pid(&self, pid: u32) -> Result<(), StartError> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let path = self.paths.pid_path();
        let mut file = options.open(path).map_err(|source| StartError::PidWrite {
            path: path.to_path_buf(),
            source,
        })?;
        writeln!(file, "{pid}").map_err(|source| StartError::PidWrite {
            path: path.to_path_buf(),
            source,
        })?;
        file.sync_all().map_err(|source| StartError::PidWrite {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            target: SUPERVISOR_TARGET,
            pid,
            file = %path.display(),
            "pid file written"
        );
        Ok(())
    }

    pub(crate) fn paths(&self) -> &RuntimePaths {
        &self.paths
    }
}

impl Drop for SupervisionLock {
    fn drop(&mut self) {
        for path in [
            self.paths.lock_path(),
            self.paths.pid_path(),
            self.paths.health_path(),
        ] {
            match fs::remove_file(path) {
                Err(error) if error.kind() != io::ErrorKind::NotFound => {
                    warn!(
                        target: SUPERVISOR_TARGET,
                        file = %path.display(),
                        error = %error,
                        "failed to remove runtime artefact"
                    );
                }
                _ => {}
            }
        }
    }
}

fn acquire_lock(paths: &RuntimePaths) -> Result<File, StartError> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    match options.open(paths.lock_path()) {
        Ok(file) => {
            info!(
                target: SUPERVISOR_TARGET,
                file = %paths.lock_path().display(),
                "acquired supervision lock"
            );
            Ok(file)
        }
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => handle_existing_lock(paths),
        Err(source) => Err(StartError::LockCreate {
            path: paths.lock_path().to_path_buf(),
            source,
        }),
    }
}

fn handle_existing_lock(paths: &RuntimePaths) -> Result<File, StartError> {
    if let Some(pid) = read_pid(paths.pid_path())
        && pid != 0
    {
        match process_alive(pid) {
            Ok(true) => {
                info!(
                    target: SUPERVISOR_TARGET,
                    pid,
                    "refusing to start: existing supervisor alive"
                );
                return Err(StartError::AlreadyRunning { pid });
            }
            Ok(false) => {
                warn!(
                    target: SUPERVISOR_TARGET,
                    pid,
                    "existing supervisor not detected; cleaning stale files"
                );
            }
            Err(error) => return Err(error),
        }
    }
    remove_file(paths.lock_path())?;
    remove_file(paths.pid_path())?;
    acquire_lock(paths)
}

fn read_pid(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse::<u32>().ok()
}

fn remove_file(path: &Path) -> Result<(), StartError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StartError::Cleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> Result<bool, StartError> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if pid == 0 {
        return Ok(false);
    }
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => Ok(true),
        Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) | Err(Errno::ECHILD) => Ok(false),
        Err(errno) => Err(StartError::CheckProcess {
            pid,
            source: io::Error::from_raw_os_error(errno as i32),
        }),
    }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> Result<bool, StartError> {
    Ok(false)
}
