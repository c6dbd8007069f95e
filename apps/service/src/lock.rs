//! Exclusive use of a data directory by one bump process.
//!
//! The running engine and every mutating CLI command hold the lock, so two
//! processes never keep diverging copies of the same registry file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use thiserror::Error;
use tracing::{debug, info, warn};

/// Lock file name inside the data directory
pub const LOCK_FILE_NAME: &str = "bump.pid";

const ACQUIRE_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Data directory is in use by bump process {pid} (lock file {})", .path.display())]
    Held { pid: u32, path: PathBuf },

    #[error("Lock file {} keeps changing hands", .path.display())]
    Contended { path: PathBuf },

    #[error("I/O error on lock file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Held lock; released when dropped
#[derive(Debug)]
pub struct DataDirLock {
    path: PathBuf,
}

impl DataDirLock {
    /// Take the lock at `path`, replacing a lock left by a dead process
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();
        let io_error = |source| LockError::Io { path: path.clone(), source };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        for _ in 0..ACQUIRE_ATTEMPTS {
            match link_pid_file(&path) {
                Ok(()) => {
                    info!(path = %path.display(), pid = process::id(), "Data directory locked");
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if let Some(pid) = holder(&path) {
                        return Err(LockError::Held { pid, path });
                    }
                    warn!(path = %path.display(), "Removing stale lock file");
                    match fs::remove_file(&path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(io_error(e)),
                    }
                }
                Err(e) => return Err(io_error(e)),
            }
        }

        Err(LockError::Contended { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        if read_pid(&self.path) != Some(process::id()) {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Data directory unlocked"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove lock file"),
        }
    }
}

/// The live process holding the lock at `path`, if any
pub fn holder(path: &Path) -> Option<u32> {
    read_pid(path).filter(|pid| is_process_running(*pid))
}

/// Publish the pid file in one step: write it aside, then hard-link it into
/// place, which fails if the lock already exists.
fn link_pid_file(path: &Path) -> io::Result<()> {
    let pid = process::id();
    let mut staging = path.as_os_str().to_owned();
    staging.push(format!(".{pid}.tmp"));
    let staging = PathBuf::from(staging);

    let written = fs::File::create(&staging).and_then(|mut file| write!(file, "{pid}"));
    let linked = written.and_then(|()| fs::hard_link(&staging, path));
    let _ = fs::remove_file(&staging);
    linked
}

fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    true
}
