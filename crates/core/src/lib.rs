//! Shared domain types for the amFTPd durable-state crates: entities,
//! the WAL entry vocabulary, store contracts, and the unified error
//! type. Nothing here touches a byte layout or a filesystem path —
//! those live in `amftpd-crypto`, `amftpd-durability`, and
//! `amftpd-storage`.

pub mod entities;
pub mod error;
pub mod traits;
pub mod wal_entry;

pub use entities::{names_eq, Group, Section, User, UserFlags};
pub use error::{Error, Result};
pub use traits::{GroupStore, RecordStore, SectionStore, UserStore};
pub use wal_entry::{WalEntry, WalEntryKind};
