//! Integration tests exercising `Store<T>` end-to-end across process
//! restarts, group rename, and WAL compaction thresholds.

use amftpd_core::{Group, RecordStore, Section, User};
use amftpd_storage::Store;
use std::collections::BTreeMap;
use tempfile::tempdir;

fn group(name: &str, members: &[&str]) -> Group {
    Group {
        name: name.to_string(),
        description: String::new(),
        users: members.iter().map(|s| s.to_string()).collect(),
        section_credits: BTreeMap::new(),
    }
}

fn user(name: &str, group: Option<&str>) -> User {
    User {
        name: name.to_string(),
        password_hash: "h".into(),
        home_dir: "/".into(),
        flags_raw: 0,
        max_concurrent_logins: 1,
        idle_timeout_sec: 900,
        max_up_kbps: 0,
        max_down_kbps: 0,
        credits_kb: 0,
        primary_group: group.map(|s| s.to_string()),
        secondary_groups: Vec::new(),
        allowed_ip_mask: None,
        required_ident: None,
    }
}

#[test]
fn group_rename_survives_a_reopen() {
    let dir = tempdir().unwrap();
    {
        let store: Store<Group> = Store::open(dir.path(), "groups", "pw", 1024 * 1024).unwrap();
        store.try_add(group("staff", &["alice", "bob"])).unwrap();
        store.try_rename("staff", "admins").unwrap();
    }

    let store: Store<Group> = Store::open(dir.path(), "groups", "pw", 1024 * 1024).unwrap();
    assert!(store.find("staff").is_none());
    let renamed = store.find("admins").expect("renamed group present");
    assert_eq!(renamed.users, vec!["alice".to_string(), "bob".to_string()]);
}

#[test]
fn rename_onto_an_existing_name_is_rejected() {
    let dir = tempdir().unwrap();
    let store: Store<Group> = Store::open(dir.path(), "groups", "pw", 1024 * 1024).unwrap();
    store.try_add(group("staff", &[])).unwrap();
    store.try_add(group("admins", &[])).unwrap();
    assert!(store.try_rename("staff", "admins").is_err());
}

#[test]
fn small_wal_threshold_triggers_compaction_transparently() {
    let dir = tempdir().unwrap();
    // A tiny threshold forces every add past the first to compact.
    let store: Store<User> = Store::open(dir.path(), "users", "pw", 64).unwrap();
    for i in 0..20 {
        store.try_add(user(&format!("user{i}"), Some("staff"))).unwrap();
    }
    assert_eq!(store.len(), 20);

    let reopened: Store<User> = Store::open(dir.path(), "users", "pw", 64).unwrap();
    assert_eq!(reopened.len(), 20);
    assert!(reopened.find("user7").is_some());
}

#[test]
fn section_virtual_root_is_normalized_on_the_real_store_path() {
    let dir = tempdir().unwrap();
    let store: Store<Section> = Store::open(dir.path(), "sections", "pw", 1024 * 1024).unwrap();
    store
        .try_add(Section {
            name: "games".into(),
            virtual_root: "games\\sub".into(),
            free_leech: false,
            ratio_upload_unit: 1,
            ratio_download_unit: 1,
            nuke_multiplier: None,
        })
        .unwrap();

    let stored = store.find("games").expect("section present");
    assert_eq!(stored.virtual_root, "/games/sub");
}

#[test]
fn three_stores_coexist_independently_in_one_directory() {
    let dir = tempdir().unwrap();
    let users: Store<User> = Store::open(dir.path(), "users", "pw", 1024 * 1024).unwrap();
    let groups: Store<Group> = Store::open(dir.path(), "groups", "pw", 1024 * 1024).unwrap();
    let sections: Store<Section> = Store::open(dir.path(), "sections", "pw", 1024 * 1024).unwrap();

    users.try_add(user("alice", Some("staff"))).unwrap();
    groups.try_add(group("staff", &["alice"])).unwrap();
    sections
        .try_add(Section {
            name: "default".into(),
            virtual_root: "/".into(),
            free_leech: false,
            ratio_upload_unit: 1,
            ratio_download_unit: 1,
            nuke_multiplier: None,
        })
        .unwrap();

    assert_eq!(users.len(), 1);
    assert_eq!(groups.len(), 1);
    assert_eq!(sections.len(), 1);
}
