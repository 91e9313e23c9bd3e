//! Value types shared by the zipscript engine: per-release and per-file
//! state, request contexts, and the read-only status snapshot handed to
//! callers and event listeners (§3, §4.9).

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;

/// Where a file currently stands relative to its SFV entry (§3, invariant 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileState {
    /// Seen on disk, not yet checked against an SFV entry.
    Pending,
    /// Listed in the SFV but never observed on disk.
    Missing,
    /// CRC matches its SFV entry.
    Ok,
    /// CRC present on both sides but does not match.
    BadCrc,
    /// Present on disk, not listed in the SFV.
    Extra,
    /// Removed by `on_delete`.
    Deleted,
    /// Release-level nuke cascaded onto this file.
    Nuked,
}

/// One SFV manifest line: `file_name` and its declared CRC32.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SfvEntry {
    pub file_name: String,
    pub expected_crc: u32,
}

/// Everything tracked about one physical file within a release.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub file_name: String,
    pub expected_crc: Option<u32>,
    pub actual_crc: Option<u32>,
    pub size_bytes: u64,
    pub state: FileState,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl FileInfo {
    fn new(file_name: String, now: DateTime<Utc>) -> Self {
        Self {
            file_name,
            expected_crc: None,
            actual_crc: None,
            size_bytes: 0,
            state: FileState::Pending,
            created_at: now,
            last_updated_at: now,
        }
    }
}

/// Nuke lifecycle fields, folded between the live `ReleaseState` and the
/// flat persisted row (§3 invariant 7).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NukeInfo {
    pub is_nuked: bool,
    pub was_nuked: bool,
    pub reason: Option<String>,
    pub by: Option<String>,
    pub multiplier: Option<f64>,
    pub nuked_at: Option<DateTime<Utc>>,
}

/// Live, mutable state for one release directory, keyed by its
/// normalized virtual path.
#[derive(Debug, Clone)]
pub struct ReleaseState {
    pub release_path: String,
    pub section_name: String,
    pub sfv_virtual_path: Option<String>,
    pub sfv_physical_path: Option<PathBuf>,
    pub started: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub nuke: NukeInfo,
    pub files: HashMap<String, FileInfo>,
    pub sfv_entries: HashMap<String, SfvEntry>,
}

impl ReleaseState {
    pub fn new(release_path: String, section_name: String, now: DateTime<Utc>) -> Self {
        Self {
            release_path,
            section_name,
            sfv_virtual_path: None,
            sfv_physical_path: None,
            started: now,
            last_updated: now,
            nuke: NukeInfo::default(),
            files: HashMap::new(),
            sfv_entries: HashMap::new(),
        }
    }

    fn file_mut(&mut self, file_name: &str, now: DateTime<Utc>) -> &mut FileInfo {
        self.files
            .entry(file_name.to_string())
            .or_insert_with(|| FileInfo::new(file_name.to_string(), now))
    }

    /// Recompute `file`'s state from its expected/actual CRCs (invariant 6).
    fn reconcile_state(file: &mut FileInfo) {
        file.state = match (file.expected_crc, file.actual_crc) {
            (Some(expected), Some(actual)) if expected == actual => FileState::Ok,
            (Some(_), Some(_)) => FileState::BadCrc,
            (Some(_), None) => FileState::Missing,
            (None, Some(_)) => FileState::Extra,
            (None, None) => FileState::Pending,
        };
    }

    /// Record an uploaded non-SFV file's observed size and CRC.
    pub fn upsert_file(&mut self, file_name: &str, size_bytes: u64, actual_crc: Option<u32>, now: DateTime<Utc>) {
        let expected = self.sfv_entries.get(file_name).map(|e| e.expected_crc);
        let file = self.file_mut(file_name, now);
        file.size_bytes = size_bytes;
        file.actual_crc = actual_crc;
        if let Some(expected) = expected {
            file.expected_crc = Some(expected);
        }
        Self::reconcile_state(file);
        file.last_updated_at = now;
        self.last_updated = now;
    }

    /// Apply a freshly parsed SFV: set every entry's expected CRC and
    /// reconcile already-known files; files with no actual CRC yet and
    /// no SFV entry become `Extra` only if currently `Pending` (§4.9).
    pub fn apply_sfv(&mut self, entries: Vec<SfvEntry>, now: DateTime<Utc>) {
        self.sfv_entries = entries.into_iter().map(|e| (e.file_name.clone(), e)).collect();

        for (name, entry) in self.sfv_entries.clone() {
            let file = self.file_mut(&name, now);
            file.expected_crc = Some(entry.expected_crc);
            Self::reconcile_state(file);
            file.last_updated_at = now;
        }
        for file in self.files.values_mut() {
            if file.expected_crc.is_none() && file.state == FileState::Pending {
                file.state = FileState::Extra;
            }
        }
        self.last_updated = now;
    }

    /// `true` once every SFV-listed file is reconciled and at least one
    /// file is `Ok` or `Extra` (§4.9 completion predicate).
    pub fn is_complete(&self) -> bool {
        let has_sfv = !self.sfv_entries.is_empty();
        if !has_sfv {
            return false;
        }
        let missing = self.files.values().filter(|f| f.state == FileState::Missing).count();
        let bad = self.files.values().filter(|f| f.state == FileState::BadCrc).count();
        let ok_or_extra = self
            .files
            .values()
            .filter(|f| matches!(f.state, FileState::Ok | FileState::Extra))
            .count();
        missing == 0 && bad == 0 && ok_or_extra > 0
    }

    /// Cascade a nuke onto every eligible file (§4.9).
    pub fn nuke(&mut self, reason: String, by: String, multiplier: f64, now: DateTime<Utc>) {
        self.nuke.is_nuked = true;
        self.nuke.was_nuked = true;
        self.nuke.reason = Some(reason);
        self.nuke.by = Some(by);
        self.nuke.multiplier = Some(multiplier);
        self.nuke.nuked_at = Some(now);
        for file in self.files.values_mut() {
            if matches!(file.state, FileState::Ok | FileState::BadCrc | FileState::Extra | FileState::Pending) {
                file.state = FileState::Nuked;
                file.last_updated_at = now;
            }
        }
        self.last_updated = now;
    }

    /// Clear the release-level nuke flag and restore nuked files to
    /// `Pending`, preserving historical reason/by/multiplier/nuked_at
    /// (§3 invariant 7, §4.9).
    pub fn unnuke(&mut self, now: DateTime<Utc>) {
        self.nuke.is_nuked = false;
        for file in self.files.values_mut() {
            if file.state == FileState::Nuked {
                file.state = FileState::Pending;
                file.last_updated_at = now;
            }
        }
        self.last_updated = now;
    }
}

/// Read-only snapshot of a release handed to callers and listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseStatus {
    pub release_path: String,
    pub section_name: String,
    pub has_sfv: bool,
    pub is_complete: bool,
    pub nuke: NukeInfo,
    pub files: Vec<FileInfo>,
    pub ok_count: usize,
    pub extra_count: usize,
    pub missing_count: usize,
    pub bad_count: usize,
}

impl From<&ReleaseState> for ReleaseStatus {
    fn from(state: &ReleaseState) -> Self {
        let mut files: Vec<FileInfo> = state.files.values().cloned().collect();
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Self {
            release_path: state.release_path.clone(),
            section_name: state.section_name.clone(),
            has_sfv: !state.sfv_entries.is_empty(),
            is_complete: state.is_complete(),
            nuke: state.nuke.clone(),
            ok_count: files.iter().filter(|f| f.state == FileState::Ok).count(),
            extra_count: files.iter().filter(|f| f.state == FileState::Extra).count(),
            missing_count: files.iter().filter(|f| f.state == FileState::Missing).count(),
            bad_count: files.iter().filter(|f| f.state == FileState::BadCrc).count(),
            files,
        }
    }
}

/// `on_upload_complete` request context.
#[derive(Debug, Clone)]
pub struct UploadContext {
    pub section: String,
    pub virtual_file_path: String,
    pub physical_file_path: PathBuf,
    pub size_bytes: u64,
    pub user: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// `on_delete` request context.
#[derive(Debug, Clone)]
pub struct DeleteContext {
    pub section: String,
    pub virtual_path: String,
    pub physical_path: Option<PathBuf>,
    pub is_directory: bool,
    pub user: Option<String>,
    pub deleted_at: DateTime<Utc>,
}

/// `on_rescan_dir` request context.
#[derive(Debug, Clone)]
pub struct RescanContext {
    pub section: String,
    pub virtual_release_path: String,
    pub physical_release_path: Option<PathBuf>,
    pub user: Option<String>,
    pub include_subdirs: bool,
    pub requested_at: DateTime<Utc>,
}

/// Context passed to `pre_detected` listeners: the first observation of
/// a brand-new release.
#[derive(Debug, Clone)]
pub struct PreContext {
    pub section: String,
    pub release_path: String,
    pub user: Option<String>,
    pub detected_at: DateTime<Utc>,
}

/// Events the engine emits while its per-release lock is still held
/// (§5): listeners must not call back into the engine synchronously.
#[derive(Debug, Clone)]
pub enum ZipscriptEvent {
    ReleaseUpdated(ReleaseStatus),
    ReleaseCompleted(ReleaseStatus),
    PreDetected(PreContext),
}

/// Replace `\` with `/`, trim, and prepend `/` if missing.
pub fn normalize_virtual_path(raw: &str) -> String {
    let mut s = raw.trim().replace('\\', "/");
    if !s.starts_with('/') {
        s = format!("/{s}");
    }
    s
}

/// The parent directory of a normalized virtual file path, or `/` if
/// the file sits at the root.
pub fn release_path_of(virtual_file_path: &str) -> String {
    let normalized = normalize_virtual_path(virtual_file_path);
    match normalized.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => normalized[..idx].to_string(),
        None => "/".to_string(),
    }
}
