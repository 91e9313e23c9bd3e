//! The release-tracking engine: SFV parsing, CRC32 verification, nuke
//! lifecycle, and a versioned JSON snapshot, all driven by upload,
//! delete, and rescan events from an external FTP daemon (§4.9).

pub mod db;
pub mod engine;
pub mod rescan_guard;
pub mod sfv;
pub mod types;

pub use engine::{ZipscriptEngine, DB_FLUSH_THRESHOLD};
pub use types::{
    DeleteContext, FileInfo, FileState, NukeInfo, PreContext, ReleaseState, ReleaseStatus, RescanContext, SfvEntry,
    UploadContext, ZipscriptEvent,
};
