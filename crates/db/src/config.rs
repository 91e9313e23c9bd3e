//! Facade configuration.
//!
//! A builder-style `DatabaseConfig`: sensible defaults, `with_*`
//! setters that consume and return `Self`, and a `validate()` step
//! `DatabaseManager::open` runs before touching disk.

use amftpd_core::{Error, Result};

/// Configuration for a [`crate::DatabaseManager::open`] call.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub(crate) master_password: String,
    pub(crate) max_wal_bytes: u64,
    pub(crate) db_flush_threshold: usize,
    pub(crate) use_mmap_for_users: bool,
}

impl DatabaseConfig {
    /// Start from a master password and sensible defaults: 5 MiB WAL
    /// compaction threshold, 32-write zipscript flush threshold, no
    /// mmap for the user store.
    pub fn new(master_password: impl Into<String>) -> Self {
        Self {
            master_password: master_password.into(),
            max_wal_bytes: amftpd_durability::DEFAULT_MAX_WAL_BYTES,
            db_flush_threshold: 32,
            use_mmap_for_users: false,
        }
    }

    pub fn with_max_wal_bytes(mut self, bytes: u64) -> Self {
        self.max_wal_bytes = bytes;
        self
    }

    pub fn with_db_flush_threshold(mut self, threshold: usize) -> Self {
        self.db_flush_threshold = threshold;
        self
    }

    pub fn with_use_mmap_for_users(mut self, use_mmap: bool) -> Self {
        self.use_mmap_for_users = use_mmap;
        self
    }

    pub fn max_wal_bytes(&self) -> u64 {
        self.max_wal_bytes
    }

    pub fn use_mmap_for_users(&self) -> bool {
        self.use_mmap_for_users
    }

    /// Reject configurations that would make `open` behave in a
    /// surprising way rather than fail loudly.
    pub fn validate(&self) -> Result<()> {
        if self.master_password.is_empty() {
            return Err(Error::ValidationError("master password must not be empty".into()));
        }
        if self.max_wal_bytes == 0 {
            return Err(Error::ValidationError("max_wal_bytes must be greater than zero".into()));
        }
        Ok(())
    }

    pub fn db_flush_threshold(&self) -> usize {
        self.db_flush_threshold
    }
}
