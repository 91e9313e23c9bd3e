//! # amFTPd durable-state core
//!
//! The encrypted, crash-safe storage spine behind a scene FTP daemon's
//! users, groups, and sections, plus the zipscript release-tracking
//! engine that watches uploads and deletes and keeps per-release SFV
//! completion state.
//!
//! Every store is a case-insensitively-keyed map backed by an
//! AES-256-GCM-sealed, LZ4-compressed snapshot and a write-ahead log of
//! the same framing; a crash between a WAL append and the in-memory
//! apply step is invisible to the next open, since replay reproduces
//! the same apply step. `DatabaseManager` wires the three stores
//! behind one open/close lifecycle with bootstrap defaults and
//! cross-store integrity checking; `ZipscriptEngine` is independent of
//! it and can be opened against any directory.
//!
//! # Quick Start
//!
//! ```no_run
//! use amftpd_dbcore::{DatabaseConfig, DatabaseManager, RecordStore};
//!
//! fn main() -> amftpd_dbcore::Result<()> {
//!     let db = DatabaseManager::open(
//!         "./var/amftpd".as_ref(),
//!         DatabaseConfig::new("master-password"),
//!     )?;
//!
//!     // The admin user, admins group, and default section already exist.
//!     assert!(db.with_users(|u| u.find("admin")).is_some());
//!
//!     let report = db.fsck_deep();
//!     assert!(report.is_clean());
//!
//!     db.close();
//!     Ok(())
//! }
//! ```
//!
//! # Crates
//!
//! | Crate | Responsibility |
//! |-------|----------------|
//! | `amftpd-core` | Entities, WAL entry vocabulary, store traits, the unified error type |
//! | `amftpd-crypto` | AEAD sealing, key derivation, LZ4 framing, CRC32, atomic file replace |
//! | `amftpd-durability` | WAL file, instance lock, portable backup codec |
//! | `amftpd-storage` | `Store<T>`, the `Record` seam, snapshot framing, single-store fsck |
//! | `amftpd-zipscript` | SFV parsing, nuke lifecycle, the release-tracking engine |
//! | `amftpd-db` | `DatabaseManager`, the facade this crate re-exports |
//!
//! Internal byte layouts and WAL framing are not part of this crate's
//! public surface; only the types re-exported below are.

pub use amftpd_core::{
    names_eq, Error, Group, GroupStore, RecordStore, Result, Section, SectionStore, User, UserFlags, UserStore,
};
pub use amftpd_db::{DatabaseConfig, DatabaseManager, DeepFsckReport, RepairReport};
pub use amftpd_storage::{FsckReport, Record, Store};
pub use amftpd_zipscript::{
    DeleteContext, FileInfo, FileState, NukeInfo, PreContext, ReleaseState, ReleaseStatus, RescanContext, SfvEntry,
    UploadContext, ZipscriptEngine, ZipscriptEvent,
};

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn facade_open_bootstraps_and_zipscript_engine_opens_independently() {
        let dir = tempdir().unwrap();
        let db = DatabaseManager::open(dir.path(), DatabaseConfig::new("pw")).unwrap();
        assert!(db.with_users(|u| u.find("admin")).is_some());

        let zipscript_dir = tempdir().unwrap();
        let engine = ZipscriptEngine::open(zipscript_dir.path()).unwrap();
        assert!(engine.status("/anything").is_none());
    }
}
