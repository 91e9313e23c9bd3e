//! The facade wiring the three record stores, the instance lock,
//! bootstrap defaults, and cross-store fsck/repair/backup behind one
//! entry point (§4.10).

pub mod config;
pub mod deep_fsck;
pub mod manager;

pub use config::DatabaseConfig;
pub use deep_fsck::{DeepFsckReport, RepairReport};
pub use manager::DatabaseManager;
