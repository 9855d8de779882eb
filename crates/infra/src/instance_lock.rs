//! Cross-process cycle lock using PID files
//!
//! Prevents two processes from running a sync cycle against the same stores
//! at the same time. The lock file is created exclusively; a file left behind
//! by a dead process is reclaimed.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use metasync_domain::{MetaSyncError, Result};

const LOCK_FILE_NAME: &str = "metasync-cycle.pid";

/// Held cycle lock; the PID file is removed on drop.
#[derive(Debug)]
pub struct InstanceLock {
    pid_file: PathBuf,
}

impl InstanceLock {
    /// Acquire the cycle lock in `lock_dir`
    ///
    /// # Errors
    /// Returns `MetaSyncError::Conflict` if a live process holds the lock,
    /// or `MetaSyncError::Unavailable` if the lock file cannot be written.
    pub fn acquire<P: AsRef<Path>>(lock_dir: P) -> Result<Self> {
        let pid_file = lock_dir.as_ref().join(LOCK_FILE_NAME);

        match Self::create_exclusive(&pid_file) {
            Ok(lock) => Ok(lock),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                Self::reclaim_if_stale(&pid_file)?;
                Self::create_exclusive(&pid_file).map_err(|err| {
                    if err.kind() == ErrorKind::AlreadyExists {
                        MetaSyncError::Conflict("cycle lock taken while reclaiming".to_string())
                    } else {
                        lock_io_error(&pid_file, &err)
                    }
                })
            }
            Err(err) => Err(lock_io_error(&pid_file, &err)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.pid_file
    }

    fn create_exclusive(pid_file: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(pid_file)?;
        let current_pid = std::process::id();
        write!(file, "{current_pid}")?;

        tracing::debug!(pid = current_pid, path = %pid_file.display(), "instance_lock.acquired");
        Ok(Self { pid_file: pid_file.to_path_buf() })
    }

    fn reclaim_if_stale(pid_file: &Path) -> Result<()> {
        let content = match fs::read_to_string(pid_file) {
            Ok(content) => content,
            // Released between our create attempt and this read.
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(lock_io_error(pid_file, &err)),
        };

        if let Ok(pid) = content.trim().parse::<u32>() {
            if Self::is_process_running(pid) {
                tracing::debug!(existing_pid = pid, "instance_lock.process_active");
                return Err(MetaSyncError::Conflict(format!(
                    "Another sync cycle is running (PID: {pid})"
                )));
            }
            tracing::warn!(stale_pid = pid, "instance_lock.stale_pid_file_detected");
        } else {
            tracing::warn!(path = %pid_file.display(), "instance_lock.unreadable_pid_file");
        }

        match fs::remove_file(pid_file) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(lock_io_error(pid_file, &err)),
        }
    }

    #[cfg(target_os = "linux")]
    fn is_process_running(pid: u32) -> bool {
        Path::new("/proc").join(pid.to_string()).exists()
    }

    #[cfg(target_os = "macos")]
    fn is_process_running(pid: u32) -> bool {
        use std::process::Command;

        // `kill -0` checks for existence without sending a signal
        Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    fn is_process_running(pid: u32) -> bool {
        // Without a liveness check only our own PID counts as running.
        tracing::warn!(pid = pid, "instance_lock.process_check_unsupported");
        pid == std::process::id()
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.pid_file) {
            tracing::warn!(error = %e, path = %self.pid_file.display(), "instance_lock.remove_pid_failed");
        } else {
            tracing::debug!(path = %self.pid_file.display(), "instance_lock.released");
        }
    }
}

fn lock_io_error(path: &Path, err: &std::io::Error) -> MetaSyncError {
    MetaSyncError::Unavailable(format!("Cycle lock {}: {err}", path.display()))
}
