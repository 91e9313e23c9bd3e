//! Error types shared by every amFTPd durable-state crate.
//!
//! One variant per error kind named in the durable-state design: lock
//! acquisition, I/O, cryptographic, and structural failures, plus the
//! validation-flavored errors the store and zipscript APIs return.

use thiserror::Error;

/// Result type alias used across the durable-state crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the durable-state spine.
#[derive(Debug, Error)]
pub enum Error {
    /// Another process already holds the instance lock for this directory.
    #[error("store directory {0:?} is already locked by another process")]
    AlreadyLocked(std::path::PathBuf),

    /// Underlying filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// AEAD seal/open or key derivation failed.
    #[error("cryptographic operation failed: {0}")]
    CryptoFailed(String),

    /// LZ4 compression or decompression failed.
    #[error("decompression failed: {0}")]
    DecompressFailed(String),

    /// A snapshot file could not be decoded.
    #[error("snapshot corrupt: {0}")]
    SnapshotCorrupt(String),

    /// A WAL file could not be decoded past a certain point.
    #[error("WAL corrupt: {0}")]
    WalCorrupt(String),

    /// A decoded record failed a structural check (bad length, bad UTF-8, ...).
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Lookup by key found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Insert/rename collided with an existing key.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A record failed domain validation (e.g. malformed virtual root).
    #[error("validation failed: {0}")]
    ValidationError(String),

    /// A backup file's magic or decryption did not check out.
    #[error("backup file is invalid or the password is wrong")]
    BackupFormatInvalid,

    /// A zipscript rescan failed to walk the physical tree.
    #[error("zipscript rescan failed: {0}")]
    ZipscriptRescanFailed(String),

    /// A persisted snapshot was written by a newer, incompatible version.
    #[error("snapshot version {found} is newer than supported version {supported}")]
    VersionTooNew {
        /// Version found in the file.
        found: u32,
        /// Highest version this build understands.
        supported: u32,
    },
}

impl Error {
    /// True for errors that are safe to recover from by falling back to
    /// bootstrap defaults (used by `Store::open`'s corruption-recovery path).
    pub fn is_recoverable_corruption(&self) -> bool {
        matches!(
            self,
            Error::SnapshotCorrupt(_) | Error::CryptoFailed(_) | Error::DecompressFailed(_)
        )
    }
}
