//! Cross-process working-directory lock using advisory file locking (fs2 flock).
//!
//! A sandbox executor owns its working directory exclusively: the directory
//! and the isolation-profile artifact inside it must never be shared by two
//! executor instances, in-process or across processes.

use anyhow::Result;
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Advisory file lock over one executor working directory.
///
/// The lock file lives inside the directory itself (`.workcell.lock`) so the
/// claim travels with the directory.
#[derive(Clone)]
pub struct WorkdirLock {
    path: PathBuf,
}

/// RAII guard that releases the lock on drop.
pub struct WorkdirLockGuard {
    file: File,
}

impl Drop for WorkdirLockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl WorkdirLock {
    pub fn new(workdir: &Path) -> Self {
        Self {
            path: workdir.join(".workcell.lock"),
        }
    }

    /// Non-blocking try-acquire — returns `None` if another holder exists.
    pub fn try_acquire(&self) -> Result<Option<WorkdirLockGuard>> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(WorkdirLockGuard { file })),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            #[cfg(unix)]
            Err(ref e) if e.raw_os_error() == Some(35) || e.raw_os_error() == Some(11) => {
                // EAGAIN(11) / EWOULDBLOCK(35 on macOS) — lock contention
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Blocking acquire — waits until the lock is available.
    pub fn acquire(&self) -> Result<WorkdirLockGuard> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.path)?;
        file.lock_exclusive()?;
        Ok(WorkdirLockGuard { file })
    }
}
