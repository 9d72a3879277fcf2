//! Advisory PID file shared between the supervisor and a cooperating child.
//!
//! A child that forks or execs a longer-lived process can write the PID that
//! should be tracked to `<dir>/.<service>.pid`. The supervisor prefers that PID
//! over the one returned by the spawn. Anyone able to write this file in the
//! working directory decides which PID gets signalled.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Environment variable injected into every spawned command.
pub const SERVICE_NAME_ENV: &str = "RKSV_SERVICE_NAME";

pub fn pid_file_name(service: &str) -> String {
    format!(".{service}.pid")
}

pub fn pid_file_path<P: AsRef<Path>>(dir: P, service: &str) -> PathBuf {
    dir.as_ref().join(pid_file_name(service))
}

/// Read the announced PID, if the file exists and holds a positive number.
pub fn read_pid<P: AsRef<Path>>(dir: P, service: &str) -> Option<i32> {
    let text = fs::read_to_string(pid_file_path(dir, service)).ok()?;
    match text.trim().parse::<i32>() {
        Ok(pid) if pid > 0 => Some(pid),
        _ => None,
    }
}

/// Write `pid` for `service` into `dir`. Refuses to write through a symlink.
pub fn announce_in<P: AsRef<Path>>(dir: P, service: &str, pid: u32) -> io::Result<PathBuf> {
    let path = pid_file_path(dir, service);
    if let Ok(meta) = fs::symlink_metadata(&path)
        && meta.file_type().is_symlink()
    {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to write pid file through symlink {}", path.display()),
        ));
    }
    fs::write(&path, pid.to_string())?;
    Ok(path)
}

/// Announce the current process when running under the supervisor.
///
/// Returns `Ok(None)` when the process was not started by a supervisor.
pub fn announce() -> io::Result<Option<PathBuf>> {
    match std::env::var(SERVICE_NAME_ENV) {
        Ok(service) if !service.is_empty() => {
            announce_in(".", &service, std::process::id()).map(Some)
        }
        _ => Ok(None),
    }
}

pub fn done_in<P: AsRef<Path>>(dir: P, service: &str) -> io::Result<()> {
    match fs::remove_file(pid_file_path(dir, service)) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        res => res,
    }
}

/// Remove the PID file written by [`announce`] on graceful exit.
pub fn done() -> io::Result<()> {
    match std::env::var(SERVICE_NAME_ENV) {
        Ok(service) if !service.is_empty() => done_in(".", &service),
        _ => Ok(()),
    }
}
