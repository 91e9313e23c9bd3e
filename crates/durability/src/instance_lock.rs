//! Exclusive lock on a store directory (§4.5, §6.5).
//!
//! `.amftpd.db.lock` is opened with `create_new`, which fails if the
//! file already exists — the simplest portable approximation of an
//! exclusive lock that works the same on every target this crate cares
//! about. The file is removed on drop; if the process is killed before
//! drop runs, a stale lock file is left behind and a future `acquire`
//! will fail until an operator removes it (best-effort cleanup, for
//! platforms without true delete-on-close).

use amftpd_core::{Error, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const LOCK_FILE_NAME: &str = ".amftpd.db.lock";

/// Holds an exclusive lock on a store directory for the lifetime of the
/// value. Dropping it releases the lock.
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the lock on `dir`. Fails with `AlreadyLocked` if another
    /// process (or another live `InstanceLock` in this process) already
    /// holds it.
    pub fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE_NAME);

        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)
            .map_err(|_| Error::AlreadyLocked(dir.to_path_buf()))?;

        let body = format!(
            "pid={}; started={}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );
        file.write_all(body.as_bytes())?;
        file.sync_all()?;

        tracing::info!(dir = ?dir, "acquired instance lock");
        Ok(Self { path })
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = ?self.path, error = %e, "failed to remove instance lock on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_on_same_dir_fails() {
        let dir = tempdir().unwrap();
        let first = InstanceLock::acquire(dir.path()).unwrap();
        let second = InstanceLock::acquire(dir.path());
        assert!(matches!(second, Err(Error::AlreadyLocked(_))));
        drop(first);
    }

    #[test]
    fn lock_is_reacquirable_after_drop() {
        let dir = tempdir().unwrap();
        {
            let _lock = InstanceLock::acquire(dir.path()).unwrap();
        }
        assert!(InstanceLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn lock_file_contains_pid_and_timestamp() {
        let dir = tempdir().unwrap();
        let _lock = InstanceLock::acquire(dir.path()).unwrap();
        let body = fs::read_to_string(dir.path().join(LOCK_FILE_NAME)).unwrap();
        assert!(body.starts_with("pid="));
        assert!(body.contains("started="));
    }
}
