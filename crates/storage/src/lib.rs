//! Encrypted, WAL-backed record stores for users, groups, and sections.
//!
//! `Store<T>` is the one engine behind all three (§4.4): a case-folded
//! in-memory map, an LZ4-then-AEAD-sealed snapshot file, and an
//! append-only WAL of the same framing for entries written since the
//! last compaction. `Record` is the seam each entity type implements to
//! plug into it; `fsck` inspects a store's files without opening one.

pub mod bytes;
pub mod fsck;
pub mod record;
pub mod records;
pub mod snapshot;
pub mod store;

pub use fsck::{fsck_store, FsckReport};
pub use record::Record;
pub use store::Store;
