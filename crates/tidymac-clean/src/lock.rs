//! The session lockfile.
//!
//! At most one cleaner session may be open at a time, enforced by a PID
//! lockfile in the state directory. A lock whose owner process is gone is
//! reclaimed with a warning.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use tidymac_core::{Result, TidyError};

/// Held for the duration of a mutating session; released on drop.
#[derive(Debug)]
pub struct SessionLock {
    path: PathBuf,
}

impl SessionLock {
    /// Acquire the lock, reclaiming it when the recorded owner is dead.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| TidyError::io(parent, e))?;
        }

        loop {
            match fs::File::options().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    write!(file, "{}", std::process::id())
                        .map_err(|e| TidyError::io(path, e))?;
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let owner = fs::read_to_string(path)
                        .ok()
                        .and_then(|s| s.trim().parse::<u32>().ok());
                    match owner {
                        Some(pid) if process_alive(pid) => {
                            return Err(TidyError::SessionLocked { pid });
                        }
                        Some(pid) => {
                            warn!(pid, "reclaiming stale session lock");
                            fs::remove_file(path).map_err(|e| TidyError::io(path, e))?;
                        }
                        None => {
                            warn!("reclaiming unreadable session lock");
                            fs::remove_file(path).map_err(|e| TidyError::io(path, e))?;
                        }
                    }
                    // Retry the create_new; another process may race us here
                    // and win, which surfaces as SessionLocked next round.
                }
                Err(e) => return Err(TidyError::io(path, e)),
            }
        }
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Whether a process with the given pid exists.
#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    // Signal 0 probes existence without delivering anything. EPERM still
    // means the process exists.
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    // Without a portable probe, assume the owner is alive; the user can
    // remove the lockfile manually.
    true
}
