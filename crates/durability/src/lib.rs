//! Durability primitives built on top of `amftpd-crypto`: the WAL file
//! format, the instance lock, and the portable backup codec.

pub mod backup;
pub mod instance_lock;
pub mod wal_file;

pub use backup::{backup, backup_bytes, decrypt as backup_decrypt, restore as backup_restore};
pub use instance_lock::InstanceLock;
pub use wal_file::{WalFile, DEFAULT_MAX_WAL_BYTES};
