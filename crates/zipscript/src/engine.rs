//! The release-tracking engine (§4.9): observes uploads, deletes, and
//! rescans; maintains per-release state under `DashMap`'s per-key
//! locking; persists a versioned JSON snapshot; emits events while the
//! release's entry is still locked.

use crate::db;
use crate::rescan_guard::RescanGuardTable;
use crate::sfv::parse_sfv;
use crate::types::{
    normalize_virtual_path, release_path_of, DeleteContext, FileState, PreContext, ReleaseState, ReleaseStatus,
    RescanContext, UploadContext, ZipscriptEvent,
};
use amftpd_core::Result;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Default pending-write count that triggers a persistence flush (§4.9).
pub const DB_FLUSH_THRESHOLD: usize = 32;

type Listener = Arc<dyn Fn(&ZipscriptEvent) + Send + Sync>;

/// The release-tracking engine.
pub struct ZipscriptEngine {
    releases: DashMap<String, ReleaseState>,
    rescan_guards: RescanGuardTable,
    listeners: Mutex<Vec<Listener>>,
    db_path: PathBuf,
    pending_writes: AtomicUsize,
    flush_threshold: usize,
}

impl ZipscriptEngine {
    /// Open the engine, loading any persisted release state at `dir`'s
    /// default zipscript db path.
    pub fn open(dir: &Path) -> Result<Self> {
        Self::open_at(db::default_path(dir))
    }

    /// Open the engine against an explicit persistence file path.
    pub fn open_at(db_path: PathBuf) -> Result<Self> {
        Self::open_with_flush_threshold(db_path, DB_FLUSH_THRESHOLD)
    }

    /// Open the engine against an explicit persistence file path with a
    /// caller-chosen flush threshold, rather than the §4.9 default.
    pub fn open_with_flush_threshold(db_path: PathBuf, flush_threshold: usize) -> Result<Self> {
        let releases = DashMap::new();
        if let Some(loaded) = db::load(&db_path)? {
            for (path, state) in loaded {
                releases.insert(path, state);
            }
        }
        Ok(Self {
            releases,
            rescan_guards: RescanGuardTable::new(),
            listeners: Mutex::new(Vec::new()),
            db_path,
            pending_writes: AtomicUsize::new(0),
            flush_threshold,
        })
    }

    /// Register a listener invoked synchronously for every event this
    /// engine emits. Listeners must not call back into the engine.
    pub fn subscribe(&self, listener: Listener) {
        self.listeners.lock().push(listener);
    }

    fn emit(&self, event: ZipscriptEvent) {
        for listener in self.listeners.lock().iter() {
            listener(&event);
        }
    }

    fn note_write(&self) {
        if self.pending_writes.fetch_add(1, Ordering::SeqCst) + 1 >= self.flush_threshold {
            self.flush();
        }
    }

    /// Force a persistence flush regardless of the pending-write count.
    pub fn flush(&self) {
        let snapshot: std::collections::HashMap<String, ReleaseState> =
            self.releases.iter().map(|r| (r.key().clone(), r.value().clone())).collect();
        match db::save(&self.db_path, &snapshot) {
            Ok(()) => self.pending_writes.store(0, Ordering::SeqCst),
            Err(e) => tracing::error!(error = %e, "zipscript persistence flush failed, will retry on next trigger"),
        }
    }

    /// Read-only snapshot of one release's status.
    pub fn status(&self, virtual_release_path: &str) -> Option<ReleaseStatus> {
        let key = normalize_virtual_path(virtual_release_path);
        self.releases.get(&key).map(|r| ReleaseStatus::from(&*r))
    }

    /// Drop all in-memory release state (does not touch the persisted file).
    pub fn clear(&self) {
        self.releases.clear();
    }

    /// Handle one completed upload.
    pub fn on_upload_complete(&self, ctx: UploadContext) {
        let virtual_path = normalize_virtual_path(&ctx.virtual_file_path);
        let release_path = release_path_of(&virtual_path);
        let file_name = virtual_path.rsplit('/').next().unwrap_or(&virtual_path).to_string();
        let is_sfv = file_name.to_ascii_lowercase().ends_with(".sfv");

        // CRC computation happens outside any lock (§5).
        let actual_crc = if is_sfv {
            None
        } else {
            match amftpd_crypto::crc32_file(&ctx.physical_file_path) {
                Ok(crc) => Some(crc),
                Err(e) => {
                    tracing::warn!(path = ?ctx.physical_file_path, error = %e, "CRC32 computation failed");
                    None
                }
            }
        };
        let sfv_content = if is_sfv { std::fs::read_to_string(&ctx.physical_file_path).ok() } else { None };

        let is_new_release = !self.releases.contains_key(&release_path);
        if is_new_release {
            self.emit(ZipscriptEvent::PreDetected(PreContext {
                section: ctx.section.clone(),
                release_path: release_path.clone(),
                user: ctx.user.clone(),
                detected_at: ctx.completed_at,
            }));
        }

        let mut entry = self
            .releases
            .entry(release_path.clone())
            .or_insert_with(|| ReleaseState::new(release_path.clone(), ctx.section.clone(), ctx.completed_at));

        let was_complete = entry.is_complete();

        if is_sfv {
            entry.sfv_virtual_path = Some(virtual_path.clone());
            entry.sfv_physical_path = Some(ctx.physical_file_path.clone());
            entry.upsert_file(&file_name, ctx.size_bytes, None, ctx.completed_at);
            if let Some(content) = sfv_content {
                let parsed = parse_sfv(&content);
                entry.apply_sfv(parsed, ctx.completed_at);
            }
        } else {
            entry.upsert_file(&file_name, ctx.size_bytes, actual_crc, ctx.completed_at);
        }

        let status = ReleaseStatus::from(&*entry);
        let became_complete = !was_complete && status.is_complete;
        // Emitted while this release's entry is still locked (§5): a
        // listener observing the update cannot race a concurrent
        // mutation of the same release.
        self.emit(ZipscriptEvent::ReleaseUpdated(status.clone()));
        if became_complete {
            self.emit(ZipscriptEvent::ReleaseCompleted(status));
        }
        drop(entry);
        self.note_write();
    }

    /// Handle a delete of a file or directory.
    pub fn on_delete(&self, ctx: DeleteContext) {
        let virtual_path = normalize_virtual_path(&ctx.virtual_path);

        if ctx.is_directory {
            self.releases.remove(&virtual_path);
            self.flush();
            return;
        }

        let release_path = release_path_of(&virtual_path);
        let file_name = virtual_path.rsplit('/').next().unwrap_or(&virtual_path).to_string();

        if let Some(mut entry) = self.releases.get_mut(&release_path) {
            if let Some(file) = entry.files.get_mut(&file_name) {
                file.state = FileState::Deleted;
                file.size_bytes = 0;
                file.actual_crc = None;
                file.last_updated_at = ctx.deleted_at;
                entry.last_updated = ctx.deleted_at;
            }
            let status = ReleaseStatus::from(&*entry);
            self.emit(ZipscriptEvent::ReleaseUpdated(status));
            drop(entry);
        }
        self.note_write();
    }

    /// Set nuke metadata on a release and cascade it to every eligible file.
    pub fn mark_release_nuked(&self, virtual_release_path: &str, nuker: &str, reason: &str, multiplier: f64) {
        let key = normalize_virtual_path(virtual_release_path);
        if let Some(mut entry) = self.releases.get_mut(&key) {
            let now = Utc::now();
            entry.nuke(reason.to_string(), nuker.to_string(), multiplier, now);
            let status = ReleaseStatus::from(&*entry);
            self.emit(ZipscriptEvent::ReleaseUpdated(status));
            drop(entry);
        }
        self.note_write();
    }

    /// Clear a release's nuke flag, restoring nuked files to `Pending`.
    pub fn mark_release_unnuked(&self, virtual_release_path: &str, _unnuker: &str) {
        let key = normalize_virtual_path(virtual_release_path);
        if let Some(mut entry) = self.releases.get_mut(&key) {
            entry.unnuke(Utc::now());
            let status = ReleaseStatus::from(&*entry);
            self.emit(ZipscriptEvent::ReleaseUpdated(status));
            drop(entry);
        }
        self.note_write();
    }

    /// Walk the physical release directory, locate its SFV, and rebuild
    /// its state from what is actually on disk, preserving nuke
    /// metadata. Returns `None` (and logs) on a filesystem error, and
    /// when `physical_release_path` is not supplied.
    pub fn on_rescan_dir(&self, ctx: RescanContext) -> Option<ReleaseStatus> {
        let release_path = normalize_virtual_path(&ctx.virtual_release_path);
        let _guard = self.rescan_guards.acquire(&release_path);

        let physical_root = ctx.physical_release_path.as_ref()?;
        let entries = match walk(physical_root, ctx.include_subdirs) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(path = ?physical_root, error = %e, "zipscript rescan failed to walk release directory");
                return None;
            }
        };

        let now = ctx.requested_at;
        let previous_nuke = self.releases.get(&release_path).map(|r| r.nuke.clone());

        let mut fresh = ReleaseState::new(release_path.clone(), ctx.section.clone(), now);
        if let Some(nuke) = previous_nuke {
            fresh.nuke = nuke;
        }

        let sfv_file = entries.iter().find(|p| p.to_ascii_lowercase().ends_with(".sfv")).cloned();
        if let Some(sfv_rel) = &sfv_file {
            let sfv_physical = physical_root.join(sfv_rel);
            if let Ok(content) = std::fs::read_to_string(&sfv_physical) {
                fresh.sfv_virtual_path = Some(format!("{release_path}/{sfv_rel}"));
                fresh.sfv_physical_path = Some(sfv_physical.clone());
                fresh.upsert_file(sfv_rel, std::fs::metadata(&sfv_physical).map(|m| m.len()).unwrap_or(0), None, now);
                fresh.apply_sfv(parse_sfv(&content), now);
            }
        }

        for rel_file in &entries {
            if Some(rel_file) == sfv_file.as_ref() {
                continue;
            }
            let physical = physical_root.join(rel_file);
            let size = std::fs::metadata(&physical).map(|m| m.len()).unwrap_or(0);
            let crc = amftpd_crypto::crc32_file(&physical).ok();
            fresh.upsert_file(rel_file, size, crc, now);
        }

        self.releases.insert(release_path.clone(), fresh);
        let status = self.status(&release_path);
        if let Some(status) = &status {
            self.emit(ZipscriptEvent::ReleaseUpdated(status.clone()));
        }
        self.note_write();
        status
    }
}

/// Relative file paths (as `/`-joined strings) under `root`, either
/// just its direct children or the full recursive tree.
fn walk(root: &Path, include_subdirs: bool) -> std::io::Result<Vec<String>> {
    let mut out = Vec::new();
    walk_into(root, root, include_subdirs, &mut out)?;
    Ok(out)
}

fn walk_into(root: &Path, dir: &Path, recurse: bool, out: &mut Vec<String>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            if recurse {
                walk_into(root, &path, recurse, out)?;
            }
            continue;
        }
        if let Ok(rel) = path.strip_prefix(root) {
            if let Some(rel) = rel.to_str() {
                out.push(rel.replace('\\', "/"));
            }
        }
    }
    Ok(())
}
