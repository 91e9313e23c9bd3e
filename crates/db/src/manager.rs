//! `DatabaseManager`: the facade wiring the three record stores, the
//! instance lock, bootstrap defaults, the deep-fsck/repair/backup
//! surface, and a `ZipscriptEngine` rooted at the same directory behind
//! one entry point (§4.10).

use crate::config::DatabaseConfig;
use crate::deep_fsck::{DeepFsckReport, RepairReport};
use amftpd_core::{Error, Group, RecordStore, Result, Section, User, UserFlags};
use amftpd_durability::InstanceLock;
use amftpd_storage::{fsck_store, FsckReport, Store};
use amftpd_zipscript::ZipscriptEngine;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};

const USERS_STORE: &str = "users";
const GROUPS_STORE: &str = "groups";
const SECTIONS_STORE: &str = "sections";

const BOOTSTRAP_ADMIN_NAME: &str = "admin";
const BOOTSTRAP_ADMIN_PASSWORD: &str = "admin";
const BOOTSTRAP_GROUP_NAME: &str = "admins";
const BOOTSTRAP_SECTION_NAME: &str = "default";

/// Open database directory, lock held, stores wired, bootstrap applied.
///
/// The user store sits behind a `RwLock` because it's the one store
/// `reload_users` replaces wholesale; groups and sections never are.
pub struct DatabaseManager {
    dir: PathBuf,
    config: DatabaseConfig,
    _lock: InstanceLock,
    users: RwLock<Store<User>>,
    groups: Store<Group>,
    sections: Store<Section>,
    zipscript: ZipscriptEngine,
}

impl DatabaseManager {
    /// Open (or initialize) the database rooted at `dir`.
    ///
    /// Any individual store that fails to open is not fatal: the
    /// failure is logged and that store starts from bootstrap defaults
    /// instead, degrading one store at a time rather than refusing to
    /// open.
    /// A failure to acquire the instance lock is fatal, since it would
    /// mean a second process is already mutating this directory.
    pub fn open(dir: &Path, config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(dir)?;
        let lock = InstanceLock::acquire(dir)?;

        if config.use_mmap_for_users {
            mmap_prefault(&dir.join(format!("{USERS_STORE}.db")))?;
        }
        let users = open_store_with_fallback(dir, USERS_STORE, &config);
        let groups = open_store_with_fallback(dir, GROUPS_STORE, &config);
        let sections = open_store_with_fallback(dir, SECTIONS_STORE, &config);
        let zipscript = ZipscriptEngine::open_with_flush_threshold(
            amftpd_zipscript::db::default_path(dir),
            config.db_flush_threshold(),
        )?;

        let manager = Self {
            dir: dir.to_path_buf(),
            config,
            _lock: lock,
            users: RwLock::new(users),
            groups,
            sections,
            zipscript,
        };
        manager.bootstrap()?;
        Ok(manager)
    }

    /// Release the instance lock early. Equivalent to dropping the
    /// manager, spelled out for callers that want the release to be
    /// explicit in their own shutdown sequence.
    pub fn close(self) {
        tracing::info!(dir = ?self.dir, "database closed");
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn bootstrap(&self) -> Result<()> {
        let users = self.users.read();
        if users.find(BOOTSTRAP_ADMIN_NAME).is_none() {
            let admin = User {
                name: BOOTSTRAP_ADMIN_NAME.to_string(),
                password_hash: amftpd_crypto::hash_password(BOOTSTRAP_ADMIN_PASSWORD),
                home_dir: "/".to_string(),
                flags_raw: UserFlags::ADMIN.bits(),
                max_concurrent_logins: 0,
                idle_timeout_sec: 0,
                max_up_kbps: 0,
                max_down_kbps: 0,
                credits_kb: User::UNLIMITED_CREDITS,
                primary_group: Some(BOOTSTRAP_GROUP_NAME.to_string()),
                secondary_groups: Vec::new(),
                allowed_ip_mask: None,
                required_ident: None,
            };
            users.try_add(admin)?;
            tracing::info!("bootstrapped admin user");
        }
        drop(users);

        if self.groups.find(BOOTSTRAP_GROUP_NAME).is_none() {
            self.groups.try_add(Group {
                name: BOOTSTRAP_GROUP_NAME.to_string(),
                description: "Site administrators".to_string(),
                users: vec![BOOTSTRAP_ADMIN_NAME.to_string()],
                section_credits: Default::default(),
            })?;
            tracing::info!("bootstrapped admins group");
        }

        if self.sections.find(BOOTSTRAP_SECTION_NAME).is_none() {
            self.sections.try_add(Section {
                name: BOOTSTRAP_SECTION_NAME.to_string(),
                virtual_root: "/".to_string(),
                free_leech: false,
                ratio_upload_unit: 1,
                ratio_download_unit: 1,
                nuke_multiplier: None,
            })?;
            tracing::info!("bootstrapped default section");
        }

        Ok(())
    }

    /// Run the user store's records through `f` under a read lock.
    pub fn with_users<R>(&self, f: impl FnOnce(&Store<User>) -> R) -> R {
        f(&self.users.read())
    }

    pub fn groups(&self) -> &Store<Group> {
        &self.groups
    }

    pub fn sections(&self) -> &Store<Section> {
        &self.sections
    }

    /// The release-tracking engine, sharing this directory and the
    /// configured flush threshold (`db_flush_threshold`).
    pub fn zipscript(&self) -> &ZipscriptEngine {
        &self.zipscript
    }

    /// Structural fsck of the user store's files.
    pub fn fsck_users(&self) -> Result<FsckReport> {
        fsck_store::<User>(&self.dir, USERS_STORE, &self.config.master_password)
    }

    pub fn fsck_groups(&self) -> Result<FsckReport> {
        fsck_store::<Group>(&self.dir, GROUPS_STORE, &self.config.master_password)
    }

    pub fn fsck_sections(&self) -> Result<FsckReport> {
        fsck_store::<Section>(&self.dir, SECTIONS_STORE, &self.config.master_password)
    }

    /// Cross-store referential-integrity check (§4.7).
    pub fn fsck_deep(&self) -> DeepFsckReport {
        let users = self.users.read();
        crate::deep_fsck::check(&users, &self.groups, &self.sections)
    }

    /// Apply the idempotent repair actions, then force a snapshot
    /// rewrite on all three stores (§4.7 step 6).
    pub fn repair(&self) -> Result<RepairReport> {
        let users = self.users.read();
        let report = crate::deep_fsck::repair(&users, &self.groups, &self.sections)?;
        drop(users);
        self.rebuild_snapshots()?;
        Ok(report)
    }

    /// Force-rewrite the snapshot and clear the WAL on all three stores.
    pub fn rebuild_snapshots(&self) -> Result<()> {
        self.users.read().force_rewrite()?;
        self.groups.force_rewrite()?;
        self.sections.force_rewrite()?;
        Ok(())
    }

    pub fn backup_users(&self, password: &str) -> Result<Vec<u8>> {
        amftpd_durability::backup(self.users.read().snapshot_path(), password)
    }

    pub fn backup_groups(&self, password: &str) -> Result<Vec<u8>> {
        amftpd_durability::backup(self.groups.snapshot_path(), password)
    }

    pub fn backup_sections(&self, password: &str) -> Result<Vec<u8>> {
        amftpd_durability::backup(self.sections.snapshot_path(), password)
    }

    /// Restore a backup over the user store's snapshot file. The store
    /// must be reopened (or `reload_users` called) to see the restored
    /// content, since the in-memory map is not touched here.
    pub fn restore_users(&self, password: &str, backup_bytes: &[u8]) -> Result<()> {
        amftpd_durability::backup_restore(self.users.read().snapshot_path(), password, backup_bytes)?;
        Ok(())
    }

    pub fn restore_groups(&self, password: &str, backup_bytes: &[u8]) -> Result<()> {
        amftpd_durability::backup_restore(self.groups.snapshot_path(), password, backup_bytes)?;
        Ok(())
    }

    pub fn restore_sections(&self, password: &str, backup_bytes: &[u8]) -> Result<()> {
        amftpd_durability::backup_restore(self.sections.snapshot_path(), password, backup_bytes)?;
        Ok(())
    }

    /// Replace the live user store with a freshly opened one, honoring
    /// `force_mmap` rather than the probable upstream bug of always
    /// reloading the mmap variant regardless of the argument (§9): when
    /// `false`, the snapshot is read the ordinary way; when `true`, it
    /// is memory-mapped and prefaulted first (see `mmap_prefault`).
    pub fn reload_users(&self, force_mmap: bool) -> Result<()> {
        if force_mmap {
            mmap_prefault(&self.dir.join(format!("{USERS_STORE}.db")))?;
        }
        let mut guard = self.users.write();
        *guard = Store::open(&self.dir, USERS_STORE, &self.config.master_password, self.config.max_wal_bytes)?;
        tracing::info!(force_mmap, "user store reloaded");
        Ok(())
    }
}

/// Memory-map the user store's snapshot file and touch every page, so
/// the pages are resident before `Store::open`'s own `std::fs::read`
/// runs. A no-op (not an error) if the snapshot doesn't exist yet.
fn mmap_prefault(snapshot_path: &Path) -> Result<()> {
    let file = match std::fs::File::open(snapshot_path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::Io(e)),
    };
    if file.metadata()?.len() == 0 {
        return Ok(());
    }
    // SAFETY: the file is only ever replaced via atomic rename by this
    // crate's own writers, never truncated or mutated in place, so a
    // concurrent writer cannot invalidate this mapping mid-read.
    let map = unsafe { memmap2::Mmap::map(&file) }?;
    let touched = map.iter().step_by(4096).fold(0u64, |acc, b| acc + *b as u64);
    tracing::debug!(path = ?snapshot_path, bytes = map.len(), checksum_bits = touched, "prefaulted snapshot via mmap");
    Ok(())
}

fn open_store_with_fallback<T: amftpd_storage::Record>(
    dir: &Path,
    store_name: &str,
    config: &DatabaseConfig,
) -> Store<T> {
    match Store::open(dir, store_name, &config.master_password, config.max_wal_bytes) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(store = store_name, error = %e, "store failed to open, quarantining and bootstrapping fresh");
            quarantine(dir, store_name);
            Store::open(dir, store_name, &config.master_password, config.max_wal_bytes)
                .expect("store must open cleanly once its on-disk files are quarantined out of the way")
        }
    }
}

/// Move a store's three files aside so a fresh, empty store can be
/// opened in their place. Best-effort: a rename failure is logged but
/// does not block the fallback-open that follows.
fn quarantine(dir: &Path, store_name: &str) {
    let suffix = chrono::Utc::now().format("%Y%m%dT%H%M%S%.f");
    for ext in ["db", "salt", "wal"] {
        let path = dir.join(format!("{store_name}.{ext}"));
        if !path.exists() {
            continue;
        }
        let quarantined = dir.join(format!("{store_name}.{ext}.quarantined-{suffix}"));
        if let Err(e) = std::fs::rename(&path, &quarantined) {
            tracing::warn!(path = ?path, error = %e, "failed to quarantine unreadable store file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amftpd_core::RecordStore;
    use tempfile::tempdir;

    #[test]
    fn open_bootstraps_admin_group_and_section() {
        let dir = tempdir().unwrap();
        let db = DatabaseManager::open(dir.path(), DatabaseConfig::new("pw")).unwrap();

        assert!(db.with_users(|u| u.find("admin")).is_some());
        assert!(db.groups().find("admins").is_some());
        assert!(db.sections().find("default").is_some());
    }

    #[test]
    fn bootstrap_is_idempotent_across_reopens() {
        let dir = tempdir().unwrap();
        {
            let db = DatabaseManager::open(dir.path(), DatabaseConfig::new("pw")).unwrap();
            db.groups().try_add(Group {
                name: "extra".into(),
                description: String::new(),
                users: Vec::new(),
                section_credits: Default::default(),
            })
            .unwrap();
        }
        let db = DatabaseManager::open(dir.path(), DatabaseConfig::new("pw")).unwrap();
        assert_eq!(db.with_users(|u| u.len()), 1);
        assert_eq!(db.groups().len(), 2);
    }

    #[test]
    fn opening_with_mmap_enabled_still_sees_bootstrap_defaults() {
        let dir = tempdir().unwrap();
        let config = DatabaseConfig::new("pw").with_use_mmap_for_users(true);
        let db = DatabaseManager::open(dir.path(), config).unwrap();
        assert!(db.with_users(|u| u.find("admin")).is_some());

        db.reload_users(true).unwrap();
        assert!(db.with_users(|u| u.find("admin")).is_some());
    }

    #[test]
    fn mmap_prefault_on_a_missing_snapshot_is_not_an_error() {
        let dir = tempdir().unwrap();
        mmap_prefault(&dir.path().join("nonexistent.db")).unwrap();
    }

    #[test]
    fn second_open_on_same_directory_fails_to_acquire_the_lock() {
        let dir = tempdir().unwrap();
        let first = DatabaseManager::open(dir.path(), DatabaseConfig::new("pw")).unwrap();
        let second = DatabaseManager::open(dir.path(), DatabaseConfig::new("pw"));
        assert!(matches!(second, Err(Error::AlreadyLocked(_))));
        drop(first);
    }

    #[test]
    fn rebuild_snapshots_compacts_every_store() {
        let dir = tempdir().unwrap();
        let db = DatabaseManager::open(dir.path(), DatabaseConfig::new("pw")).unwrap();
        db.rebuild_snapshots().unwrap();
        assert!(db.fsck_users().unwrap().is_clean());
        assert!(db.fsck_groups().unwrap().is_clean());
        assert!(db.fsck_sections().unwrap().is_clean());
    }

    #[test]
    fn reload_users_picks_up_changes_written_by_another_handle_path() {
        let dir = tempdir().unwrap();
        let db = DatabaseManager::open(dir.path(), DatabaseConfig::new("pw")).unwrap();
        db.with_users(|u| u.try_add(User {
            name: "alice".into(),
            password_hash: "h".into(),
            home_dir: "/".into(),
            flags_raw: 0,
            max_concurrent_logins: 1,
            idle_timeout_sec: 900,
            max_up_kbps: 0,
            max_down_kbps: 0,
            credits_kb: 0,
            primary_group: None,
            secondary_groups: Vec::new(),
            allowed_ip_mask: None,
            required_ident: None,
        }))
        .unwrap();
        db.rebuild_snapshots().unwrap();

        db.reload_users(true).unwrap();
        assert!(db.with_users(|u| u.find("alice")).is_some());
    }

    #[test]
    fn db_flush_threshold_reaches_the_owned_zipscript_engine() {
        let dir = tempdir().unwrap();
        let config = DatabaseConfig::new("pw").with_db_flush_threshold(1);
        let db = DatabaseManager::open(dir.path(), config).unwrap();

        db.zipscript().on_upload_complete(amftpd_zipscript::UploadContext {
            section: "MP3".into(),
            virtual_file_path: "/rel/file.dat".into(),
            physical_file_path: dir.path().join("file.dat"),
            size_bytes: 1,
            user: None,
            completed_at: chrono::Utc::now(),
        });

        assert!(amftpd_zipscript::db::default_path(dir.path()).exists());
    }

    #[test]
    fn backup_then_restore_users_round_trips() {
        let dir = tempdir().unwrap();
        let db = DatabaseManager::open(dir.path(), DatabaseConfig::new("pw")).unwrap();
        db.rebuild_snapshots().unwrap();
        let backup = db.backup_users("backup-pw").unwrap();

        db.restore_users("backup-pw", &backup).unwrap();
        db.reload_users(false).unwrap();
        assert!(db.with_users(|u| u.find("admin")).is_some());
    }
}
