//! Versioned JSON persistence for release state (§4.9 Persistence,
//! §6.4). Rows are flat per file; reconstruction groups them back into
//! `ReleaseState`s by release path, folding each release's nuke fields
//! from its files' rows.

use crate::types::{FileInfo, FileState, ReleaseState};
use amftpd_core::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Current on-disk schema version.
pub const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ZipscriptFileRow {
    release_path: String,
    section_name: String,
    file_name: String,
    size_bytes: u64,
    expected_crc: Option<u32>,
    actual_crc: Option<u32>,
    state: FileState,
    is_nuked: bool,
    nuke_reason: Option<String>,
    nuked_by: Option<String>,
    created_at: DateTime<Utc>,
    last_updated_at: DateTime<Utc>,
    nuked_at: Option<DateTime<Utc>>,
    nuke_multiplier: Option<f64>,
}

impl serde::Serialize for FileState {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        let name = match self {
            FileState::Pending => "pending",
            FileState::Missing => "missing",
            FileState::Ok => "ok",
            FileState::BadCrc => "bad_crc",
            FileState::Extra => "extra",
            FileState::Deleted => "deleted",
            FileState::Nuked => "nuked",
        };
        s.serialize_str(name)
    }
}

impl<'de> serde::Deserialize<'de> for FileState {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Ok(match s.as_str() {
            "pending" => FileState::Pending,
            "missing" => FileState::Missing,
            "ok" => FileState::Ok,
            "bad_crc" => FileState::BadCrc,
            "extra" => FileState::Extra,
            "deleted" => FileState::Deleted,
            "nuked" => FileState::Nuked,
            other => return Err(serde::de::Error::custom(format!("unknown file state {other:?}"))),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Versioned {
    version: u32,
    files: Vec<ZipscriptFileRow>,
}

/// Load persisted release state from `path`, tolerating the legacy bare
/// array format (v0) and returning `None` if the file doesn't exist.
pub fn load(path: &Path) -> Result<Option<HashMap<String, ReleaseState>>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    };
    if bytes.is_empty() {
        return Ok(None);
    }

    let rows = parse_document(&bytes)?;
    Ok(Some(reconstruct(rows)))
}

fn parse_document(bytes: &[u8]) -> Result<Vec<ZipscriptFileRow>> {
    // Legacy v0 documents are a bare JSON array of rows.
    if let Ok(rows) = serde_json::from_slice::<Vec<ZipscriptFileRow>>(bytes) {
        return Ok(rows);
    }
    let doc: Versioned =
        serde_json::from_slice(bytes).map_err(|e| Error::SnapshotCorrupt(format!("zipscript db malformed: {e}")))?;
    if doc.version > CURRENT_VERSION {
        return Err(Error::VersionTooNew {
            found: doc.version,
            supported: CURRENT_VERSION,
        });
    }
    Ok(doc.files)
}

fn reconstruct(rows: Vec<ZipscriptFileRow>) -> HashMap<String, ReleaseState> {
    let mut releases: HashMap<String, ReleaseState> = HashMap::new();
    for row in rows {
        let release = releases
            .entry(row.release_path.clone())
            .or_insert_with(|| ReleaseState::new(row.release_path.clone(), row.section_name.clone(), row.created_at));

        if row.is_nuked || row.nuked_at.is_some() {
            release.nuke.was_nuked = true;
        }
        if row.is_nuked {
            release.nuke.is_nuked = true;
        }
        if row.nuke_reason.is_some() {
            release.nuke.reason = row.nuke_reason.clone();
            release.nuke.by = row.nuked_by.clone();
            release.nuke.multiplier = row.nuke_multiplier;
            release.nuke.nuked_at = row.nuked_at;
        }
        if row.last_updated_at > release.last_updated {
            release.last_updated = row.last_updated_at;
        }
        if let Some(expected_crc) = row.expected_crc {
            release.sfv_entries.insert(
                row.file_name.clone(),
                crate::types::SfvEntry {
                    file_name: row.file_name.clone(),
                    expected_crc,
                },
            );
        }

        release.files.insert(
            row.file_name.clone(),
            FileInfo {
                file_name: row.file_name,
                expected_crc: row.expected_crc,
                actual_crc: row.actual_crc,
                size_bytes: row.size_bytes,
                state: row.state,
                created_at: row.created_at,
                last_updated_at: row.last_updated_at,
            },
        );
    }
    releases
}

/// Flatten every release into rows and write the versioned document
/// atomically.
pub fn save(path: &Path, releases: &HashMap<String, ReleaseState>) -> Result<()> {
    let mut files = Vec::new();
    for release in releases.values() {
        for file in release.files.values() {
            files.push(ZipscriptFileRow {
                release_path: release.release_path.clone(),
                section_name: release.section_name.clone(),
                file_name: file.file_name.clone(),
                size_bytes: file.size_bytes,
                expected_crc: file.expected_crc,
                actual_crc: file.actual_crc,
                state: file.state,
                is_nuked: release.nuke.is_nuked,
                nuke_reason: release.nuke.reason.clone(),
                nuked_by: release.nuke.by.clone(),
                created_at: file.created_at,
                last_updated_at: file.last_updated_at,
                nuked_at: release.nuke.nuked_at,
                nuke_multiplier: release.nuke.multiplier,
            });
        }
    }
    let doc = Versioned { version: CURRENT_VERSION, files };
    let bytes = serde_json::to_vec_pretty(&doc).map_err(|e| Error::SnapshotCorrupt(format!("zipscript db serialize failed: {e}")))?;
    amftpd_crypto::write_atomic(path, &bytes)?;
    Ok(())
}

/// Suggested default persistence path for a zipscript engine rooted at `dir`.
pub fn default_path(dir: &Path) -> PathBuf {
    dir.join("zipscript.db.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SfvEntry;
    use chrono::Utc;
    use tempfile::tempdir;

    fn sample_releases() -> HashMap<String, ReleaseState> {
        let now = Utc::now();
        let mut release = ReleaseState::new("/MP3/rel".into(), "MP3".into(), now);
        release.apply_sfv(vec![SfvEntry { file_name: "file1.dat".into(), expected_crc: 0xA1B2C3D4 }], now);
        release.upsert_file("file1.dat", 100, Some(0xA1B2C3D4), now);
        let mut releases = HashMap::new();
        releases.insert(release.release_path.clone(), release);
        releases
    }

    #[test]
    fn save_then_load_round_trips_basic_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zs.json");
        let releases = sample_releases();
        save(&path, &releases).unwrap();

        let loaded = load(&path).unwrap().unwrap();
        let release = loaded.get("/MP3/rel").unwrap();
        assert_eq!(release.files.get("file1.dat").unwrap().state, FileState::Ok);
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(load(&path).unwrap().is_none());
    }

    #[test]
    fn legacy_bare_array_document_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        let now = Utc::now();
        let row = ZipscriptFileRow {
            release_path: "/rel".into(),
            section_name: "MP3".into(),
            file_name: "a.dat".into(),
            size_bytes: 10,
            expected_crc: None,
            actual_crc: None,
            state: FileState::Pending,
            is_nuked: false,
            nuke_reason: None,
            nuked_by: None,
            created_at: now,
            last_updated_at: now,
            nuked_at: None,
            nuke_multiplier: None,
        };
        std::fs::write(&path, serde_json::to_vec(&vec![row]).unwrap()).unwrap();

        let loaded = load(&path).unwrap().unwrap();
        assert!(loaded.contains_key("/rel"));
    }

    #[test]
    fn future_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("future.json");
        std::fs::write(&path, br#"{"version":99,"files":[]}"#).unwrap();
        assert!(matches!(load(&path), Err(Error::VersionTooNew { .. })));
    }
}
