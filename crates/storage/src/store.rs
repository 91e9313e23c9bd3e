//! The generic record store: a case-insensitively-keyed in-memory map
//! backed by an encrypted snapshot and WAL pair (§4.4).
//!
//! Every mutation follows the same protocol: validate, encode, append
//! to the WAL (fsynced), only then apply to the in-memory map. A crash
//! between WAL append and in-memory apply is invisible to the next
//! `open`, since replay reproduces the same apply step.

use crate::record::Record;
use crate::records::group;
use crate::snapshot::{self, LoadedSnapshot};
use amftpd_core::{Error, GroupStore, RecordStore, Result, SectionStore, UserStore, WalEntry, WalEntryKind};
use amftpd_durability::WalFile;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// An open, durable, encrypted store of `T` records.
pub struct Store<T: Record> {
    snapshot_path: PathBuf,
    key: [u8; amftpd_crypto::KEY_LEN],
    map: RwLock<HashMap<String, T>>,
    wal: Mutex<WalFile>,
    _marker: PhantomData<T>,
}

impl<T: Record> Store<T> {
    /// Open (or initialize) the store named `store_name` inside `dir`.
    ///
    /// `dir` holds three files per store: `<name>.db` (snapshot),
    /// `<name>.salt`, and `<name>.wal`. A missing salt alongside a
    /// non-empty snapshot is treated as corruption: generating a fresh
    /// salt would silently make the existing snapshot permanently
    /// unreadable rather than merely empty.
    pub fn open(dir: &Path, store_name: &str, master_password: &str, max_wal_bytes: u64) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let snapshot_path = dir.join(format!("{store_name}.db"));
        let salt_path = dir.join(format!("{store_name}.salt"));
        let wal_path = dir.join(format!("{store_name}.wal"));

        let snapshot_nonempty = std::fs::metadata(&snapshot_path).map(|m| m.len() > 0).unwrap_or(false);
        if !salt_path.exists() && snapshot_nonempty {
            return Err(Error::SnapshotCorrupt(format!(
                "salt file missing for non-empty snapshot {snapshot_path:?}"
            )));
        }

        let salt = amftpd_crypto::ensure_salt(&salt_path)?;
        let key = amftpd_crypto::derive_key(master_password, &salt);

        let mut map = match snapshot::load_snapshot::<T>(&snapshot_path, &key)? {
            LoadedSnapshot::Absent => HashMap::new(),
            LoadedSnapshot::Records(records) => records
                .into_iter()
                .map(|r| (r.name().to_ascii_lowercase(), r))
                .collect(),
            LoadedSnapshot::Corrupt(_) => HashMap::new(),
        };

        let wal = WalFile::open(&wal_path, key, max_wal_bytes)?;
        for entry in wal.read_all()? {
            apply_wal_entry::<T>(&mut map, entry)?;
        }

        tracing::info!(store = store_name, records = map.len(), "store opened");

        Ok(Self {
            snapshot_path,
            key,
            map: RwLock::new(map),
            wal: Mutex::new(wal),
            _marker: PhantomData,
        })
    }

    /// Rewrite the snapshot from the current in-memory map and clear the
    /// WAL (§4.4 compaction). Also the path used by `DatabaseManager`'s
    /// `rebuild_snapshots` (§4.7).
    pub fn force_rewrite(&self) -> Result<()> {
        let records: Vec<T> = self.map.read().values().cloned().collect();
        snapshot::write_snapshot(&self.snapshot_path, &self.key, &records)?;
        self.wal.lock().clear()?;
        tracing::debug!(records = records.len(), "snapshot rewritten, WAL cleared");
        Ok(())
    }

    fn compact_if_needed(&self) -> Result<()> {
        if self.wal.lock().needs_compaction() {
            self.force_rewrite()?;
        }
        Ok(())
    }

    /// Raw bytes of the on-disk snapshot file, for backup (§4.8).
    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }
}

impl<T: Record> RecordStore<T> for Store<T> {
    fn find(&self, name: &str) -> Option<T> {
        self.map.read().get(&name.to_ascii_lowercase()).cloned()
    }

    fn all(&self) -> Vec<T> {
        self.map.read().values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.map.read().len()
    }

    fn try_add(&self, mut record: T) -> Result<()> {
        record.normalize();
        record.validate()?;
        let key = record.name().to_ascii_lowercase();

        let mut map = self.map.write();
        if map.contains_key(&key) {
            return Err(Error::AlreadyExists(record.name().to_string()));
        }

        let payload = record.encode();
        self.wal.lock().append(&WalEntry::new(T::add_kind(), payload))?;
        map.insert(key, record);
        drop(map);
        self.compact_if_needed()
    }

    fn try_update(&self, mut record: T) -> Result<()> {
        record.normalize();
        record.validate()?;
        let key = record.name().to_ascii_lowercase();

        let mut map = self.map.write();
        if !map.contains_key(&key) {
            return Err(Error::NotFound(record.name().to_string()));
        }

        let payload = record.encode();
        self.wal.lock().append(&WalEntry::new(T::update_kind(), payload))?;
        map.insert(key, record);
        drop(map);
        self.compact_if_needed()
    }

    fn try_delete(&self, name: &str) -> Result<()> {
        let key = name.to_ascii_lowercase();

        let mut map = self.map.write();
        if !map.contains_key(&key) {
            return Err(Error::NotFound(name.to_string()));
        }

        self.wal
            .lock()
            .append(&WalEntry::new(T::delete_kind(), name.as_bytes().to_vec()))?;
        map.remove(&key);
        drop(map);
        self.compact_if_needed()
    }
}

impl Store<amftpd_core::Group> {
    /// Rename a group in place, preserving members and credits (§4.4:
    /// the one record kind that supports rename).
    pub fn try_rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        let old_key = old_name.to_ascii_lowercase();

        let mut map = self.map.write();
        if !map.contains_key(&old_key) {
            return Err(Error::NotFound(old_name.to_string()));
        }
        if !old_name.eq_ignore_ascii_case(new_name) && map.contains_key(&new_name.to_ascii_lowercase()) {
            return Err(Error::AlreadyExists(new_name.to_string()));
        }

        let payload = group::encode_rename(old_name, new_name);
        self.wal.lock().append(&WalEntry::new(WalEntryKind::RenameGroup, payload))?;
        amftpd_core::Group::apply_rename(&mut map, &old_key, new_name)?;
        drop(map);
        self.compact_if_needed()
    }
}

impl UserStore for Store<amftpd_core::User> {}

impl GroupStore for Store<amftpd_core::Group> {
    fn try_rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        Store::try_rename(self, old_name, new_name)
    }
}

impl SectionStore for Store<amftpd_core::Section> {}

fn apply_wal_entry<T: Record>(map: &mut HashMap<String, T>, entry: WalEntry) -> Result<()> {
    if entry.kind == T::add_kind() || entry.kind == T::update_kind() {
        match T::decode(&entry.payload)? {
            Some(record) => {
                map.insert(record.name().to_ascii_lowercase(), record);
            }
            None => tracing::warn!("skipping WAL entry for unrecognized record type"),
        }
    } else if entry.kind == T::delete_kind() {
        let name = String::from_utf8_lossy(&entry.payload).to_string();
        map.remove(&name.to_ascii_lowercase());
    } else if entry.kind == WalEntryKind::RenameGroup {
        let (old, new) = group::decode_rename(&entry.payload)?;
        T::apply_rename(map, &old.to_ascii_lowercase(), &new)?;
    } else {
        tracing::warn!(kind = ?entry.kind, "WAL entry kind not applicable to this store, skipping");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use amftpd_core::{RecordStore, User};
    use tempfile::tempdir;

    fn user(name: &str) -> User {
        User {
            name: name.to_string(),
            password_hash: "hash".into(),
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
        }
    }

    #[test]
    fn add_find_delete_round_trip() {
        let dir = tempdir().unwrap();
        let store: Store<User> = Store::open(dir.path(), "users", "pw", 1024 * 1024).unwrap();
        store.try_add(user("alice")).unwrap();
        assert!(store.find("ALICE").is_some());
        assert_eq!(store.len(), 1);

        store.try_delete("alice").unwrap();
        assert!(store.find("alice").is_none());
    }

    #[test]
    fn add_is_case_insensitively_unique() {
        let dir = tempdir().unwrap();
        let store: Store<User> = Store::open(dir.path(), "users", "pw", 1024 * 1024).unwrap();
        store.try_add(user("alice")).unwrap();
        assert!(matches!(store.try_add(user("ALICE")), Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn update_missing_record_is_not_found() {
        let dir = tempdir().unwrap();
        let store: Store<User> = Store::open(dir.path(), "users", "pw", 1024 * 1024).unwrap();
        assert!(matches!(store.try_update(user("ghost")), Err(Error::NotFound(_))));
    }

    #[test]
    fn reopen_replays_wal_without_a_prior_snapshot_rewrite() {
        let dir = tempdir().unwrap();
        {
            let store: Store<User> = Store::open(dir.path(), "users", "pw", 1024 * 1024).unwrap();
            store.try_add(user("alice")).unwrap();
            store.try_add(user("bob")).unwrap();
            store.try_delete("bob").unwrap();
        }
        let reopened: Store<User> = Store::open(dir.path(), "users", "pw", 1024 * 1024).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.find("alice").is_some());
        assert!(reopened.find("bob").is_none());
    }

    #[test]
    fn force_rewrite_compacts_wal_and_preserves_state() {
        let dir = tempdir().unwrap();
        let store: Store<User> = Store::open(dir.path(), "users", "pw", 1024 * 1024).unwrap();
        store.try_add(user("alice")).unwrap();
        store.force_rewrite().unwrap();

        let reopened: Store<User> = Store::open(dir.path(), "users", "pw", 1024 * 1024).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.find("alice").is_some());
    }

    #[test]
    fn wrong_master_password_yields_empty_store_not_a_crash() {
        let dir = tempdir().unwrap();
        {
            let store: Store<User> = Store::open(dir.path(), "users", "pw", 1024 * 1024).unwrap();
            store.try_add(user("alice")).unwrap();
            store.force_rewrite().unwrap();
        }
        let reopened: Store<User> = Store::open(dir.path(), "users", "wrong-pw", 1024 * 1024).unwrap();
        assert_eq!(reopened.len(), 0);
    }
}
