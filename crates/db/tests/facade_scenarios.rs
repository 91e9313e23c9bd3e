//! End-to-end scenarios against the public `DatabaseManager` facade:
//! bootstrap, deep fsck finding a dangling reference, repair fixing it,
//! and a backup/restore/reload round trip.

use amftpd_core::{Group, RecordStore, User};
use amftpd_db::{DatabaseConfig, DatabaseManager};
use std::collections::BTreeMap;
use tempfile::tempdir;

fn user(name: &str) -> User {
    User {
        name: name.into(),
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
    }
}

#[test]
fn fresh_database_bootstraps_and_passes_every_fsck() {
    let dir = tempdir().unwrap();
    let db = DatabaseManager::open(dir.path(), DatabaseConfig::new("pw")).unwrap();

    assert!(db.fsck_users().unwrap().is_clean());
    assert!(db.fsck_groups().unwrap().is_clean());
    assert!(db.fsck_sections().unwrap().is_clean());
    assert!(db.fsck_deep().is_clean());
}

#[test]
fn deep_fsck_then_repair_clears_a_dangling_group_reference() {
    let dir = tempdir().unwrap();
    let db = DatabaseManager::open(dir.path(), DatabaseConfig::new("pw")).unwrap();

    db.groups()
        .try_add(Group {
            name: "leechers".into(),
            description: String::new(),
            users: vec!["nobody".into()],
            section_credits: BTreeMap::new(),
        })
        .unwrap();

    let report = db.fsck_deep();
    assert!(!report.is_clean());

    let repair_report = db.repair().unwrap();
    assert!(!repair_report.actions_taken.is_empty());
    assert!(db.fsck_deep().is_clean());
    assert!(db.groups().find("leechers").unwrap().users.is_empty());
}

#[test]
fn restoring_an_earlier_backup_undoes_a_later_write_after_reload() {
    let dir = tempdir().unwrap();
    let db = DatabaseManager::open(dir.path(), DatabaseConfig::new("pw")).unwrap();
    db.rebuild_snapshots().unwrap();
    let admin_only_backup = db.backup_users("backup-pw").unwrap();

    db.with_users(|u| u.try_add(user("alice"))).unwrap();
    db.rebuild_snapshots().unwrap();
    assert!(db.with_users(|u| u.find("alice")).is_some());

    db.restore_users("backup-pw", &admin_only_backup).unwrap();
    db.reload_users(false).unwrap();

    assert!(db.with_users(|u| u.find("admin")).is_some());
    assert!(db.with_users(|u| u.find("alice")).is_none());
}
