//! Cross-store referential-integrity checks and idempotent repair
//! (§4.7). Unlike `amftpd_storage::fsck_store`, these checks need all
//! three live stores at once: a user's `primary_group` can only be
//! validated against the groups store, and so on.

use amftpd_core::{Group, RecordStore, Result, Section, User};
use amftpd_storage::Store;
use std::collections::HashSet;

/// Findings from a [`crate::DatabaseManager::fsck_deep`] pass.
#[derive(Debug, Default, Clone)]
pub struct DeepFsckReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl DeepFsckReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Actions a [`crate::DatabaseManager::repair`] pass actually took.
#[derive(Debug, Default, Clone)]
pub struct RepairReport {
    pub actions_taken: Vec<String>,
}

pub(crate) fn check(users: &Store<User>, groups: &Store<Group>, sections: &Store<Section>) -> DeepFsckReport {
    let mut report = DeepFsckReport::default();
    let group_names: HashSet<String> = groups.all().iter().map(|g| g.name.to_ascii_lowercase()).collect();
    let user_names: HashSet<String> = users.all().iter().map(|u| u.name.to_ascii_lowercase()).collect();
    let section_names: HashSet<String> = sections.all().iter().map(|s| s.name.to_ascii_lowercase()).collect();

    for user in users.all() {
        if let Some(primary) = &user.primary_group {
            if !group_names.contains(&primary.to_ascii_lowercase()) {
                report
                    .errors
                    .push(format!("user {:?} primary_group {:?} does not exist", user.name, primary));
            }
        }
        check_name(&user.name, "user", &mut report);
    }

    let mut seen_virtual_roots: HashSet<String> = HashSet::new();
    for section in sections.all() {
        if section.name.trim().is_empty() {
            report.errors.push("section has an empty name".to_string());
        }
        if section.virtual_root.trim().is_empty() {
            report
                .errors
                .push(format!("section {:?} has an empty virtual_root", section.name));
        } else if !seen_virtual_roots.insert(section.virtual_root.to_ascii_lowercase()) {
            report.errors.push(format!(
                "section {:?} shares virtual_root {:?} with another section",
                section.name, section.virtual_root
            ));
        }
        if section.nuke_multiplier.is_some_and(|m| m < 0.0) {
            report
                .warnings
                .push(format!("section {:?} has a negative nuke_multiplier", section.name));
        }
        check_name(&section.name, "section", &mut report);
    }

    for group in groups.all() {
        for member in &group.users {
            if !user_names.contains(&member.to_ascii_lowercase()) {
                report
                    .errors
                    .push(format!("group {:?} references unknown user {:?}", group.name, member));
            }
        }
        for (section_name, credits) in &group.section_credits {
            if !section_names.contains(&section_name.to_ascii_lowercase()) {
                report.errors.push(format!(
                    "group {:?} grants credits against unknown section {:?}",
                    group.name, section_name
                ));
            }
            if *credits < 0 {
                report
                    .warnings
                    .push(format!("group {:?} has negative credits for section {:?}", group.name, section_name));
            }
        }
        check_name(&group.name, "group", &mut report);
    }

    report
}

fn check_name(name: &str, kind: &str, report: &mut DeepFsckReport) {
    if name.chars().any(|c| c.is_control()) {
        report.warnings.push(format!("{kind} name {name:?} contains control or NUL characters"));
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars().filter(|c| !c.is_control()).collect()
}

pub(crate) fn repair(users: &Store<User>, groups: &Store<Group>, sections: &Store<Section>) -> Result<RepairReport> {
    let mut report = RepairReport::default();
    let group_names: HashSet<String> = groups.all().iter().map(|g| g.name.to_ascii_lowercase()).collect();

    // 1. Drop unknown-group primary-group references.
    for mut user in users.all() {
        if let Some(primary) = &user.primary_group {
            if !group_names.contains(&primary.to_ascii_lowercase()) {
                user.primary_group = None;
                report.actions_taken.push(format!("cleared {:?}'s unknown primary_group", user.name));
                users.try_update(user)?;
            }
        }
    }

    let user_names: HashSet<String> = users.all().iter().map(|u| u.name.to_ascii_lowercase()).collect();
    let section_names: HashSet<String> = sections.all().iter().map(|s| s.name.to_ascii_lowercase()).collect();

    // 2. Remove unknown-user members; dedupe. 3. Drop unknown-section
    // credit entries; clamp negatives.
    for mut group in groups.all() {
        let before_members = group.users.len();
        group.users.retain(|m| user_names.contains(&m.to_ascii_lowercase()));
        if group.users.len() != before_members {
            report.actions_taken.push(format!("dropped unknown members from group {:?}", group.name));
        }
        group.dedup_users();

        let before_credits = group.section_credits.len();
        group.section_credits.retain(|s, _| section_names.contains(&s.to_ascii_lowercase()));
        if group.section_credits.len() != before_credits {
            report.actions_taken.push(format!("dropped unknown section credits from group {:?}", group.name));
        }
        for credit in group.section_credits.values_mut() {
            if *credit < 0 {
                *credit = 0;
                report.actions_taken.push(format!("clamped negative credit in group {:?}", group.name));
            }
        }
        groups.try_update(group)?;
    }

    // 4. Drop the second of any two sections sharing a virtual root;
    // clamp negative multipliers; drop empty-named sections.
    let mut seen_virtual_roots: HashSet<String> = HashSet::new();
    for section in sections.all() {
        if section.name.trim().is_empty() {
            sections.try_delete(&section.name)?;
            report.actions_taken.push("dropped a section with an empty name".to_string());
            continue;
        }
        if !seen_virtual_roots.insert(section.virtual_root.to_ascii_lowercase()) {
            sections.try_delete(&section.name)?;
            report.actions_taken.push(format!("dropped section {:?}, duplicate virtual_root", section.name));
            continue;
        }
        if section.nuke_multiplier.is_some_and(|m| m < 0.0) {
            let mut fixed = section.clone();
            fixed.nuke_multiplier = Some(0.0);
            sections.try_update(fixed)?;
            report.actions_taken.push(format!("clamped negative nuke_multiplier on section {:?}", section.name));
        }
    }

    // 5. Sanitize names of control/NUL characters.
    for user in users.all() {
        let clean = sanitize_name(&user.name);
        if clean != user.name && users.find(&clean).is_none() {
            let mut renamed = user.clone();
            renamed.name = clean.clone();
            users.try_delete(&user.name)?;
            users.try_add(renamed)?;
            report.actions_taken.push(format!("sanitized user name {:?} -> {:?}", user.name, clean));
        }
    }
    for section in sections.all() {
        let clean = sanitize_name(&section.name);
        if clean != section.name && sections.find(&clean).is_none() {
            let mut renamed = section.clone();
            renamed.name = clean.clone();
            sections.try_delete(&section.name)?;
            sections.try_add(renamed)?;
            report.actions_taken.push(format!("sanitized section name {:?} -> {:?}", section.name, clean));
        }
    }
    for group in groups.all() {
        let clean = sanitize_name(&group.name);
        if clean != group.name && groups.find(&clean).is_none() {
            groups.try_rename(&group.name, &clean)?;
            report.actions_taken.push(format!("sanitized group name {:?} -> {:?}", group.name, clean));
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use amftpd_core::RecordStore;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn user(name: &str, primary_group: Option<&str>) -> User {
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
            primary_group: primary_group.map(String::from),
            secondary_groups: Vec::new(),
            allowed_ip_mask: None,
            required_ident: None,
        }
    }

    fn group(name: &str, users: Vec<&str>, section_credits: BTreeMap<String, i64>) -> Group {
        Group {
            name: name.into(),
            description: String::new(),
            users: users.into_iter().map(String::from).collect(),
            section_credits,
        }
    }

    fn section(name: &str, virtual_root: &str) -> Section {
        Section {
            name: name.into(),
            virtual_root: virtual_root.into(),
            free_leech: false,
            ratio_upload_unit: 1,
            ratio_download_unit: 1,
            nuke_multiplier: None,
        }
    }

    #[test]
    fn check_reports_dangling_primary_group() {
        let dir = tempdir().unwrap();
        let users: Store<User> = Store::open(dir.path(), "users", "pw", 1024 * 1024).unwrap();
        let groups: Store<Group> = Store::open(dir.path(), "groups", "pw", 1024 * 1024).unwrap();
        let sections: Store<Section> = Store::open(dir.path(), "sections", "pw", 1024 * 1024).unwrap();
        users.try_add(user("alice", Some("ghosts"))).unwrap();

        let report = check(&users, &groups, &sections);
        assert!(!report.is_clean());
        assert!(report.errors.iter().any(|e| e.contains("ghosts")));
    }

    #[test]
    fn repair_clears_dangling_primary_group_and_stays_clean() {
        let dir = tempdir().unwrap();
        let users: Store<User> = Store::open(dir.path(), "users", "pw", 1024 * 1024).unwrap();
        let groups: Store<Group> = Store::open(dir.path(), "groups", "pw", 1024 * 1024).unwrap();
        let sections: Store<Section> = Store::open(dir.path(), "sections", "pw", 1024 * 1024).unwrap();
        users.try_add(user("alice", Some("ghosts"))).unwrap();

        repair(&users, &groups, &sections).unwrap();
        assert!(users.find("alice").unwrap().primary_group.is_none());
        assert!(check(&users, &groups, &sections).is_clean());
    }

    #[test]
    fn repair_drops_duplicate_virtual_roots_and_unknown_group_members() {
        let dir = tempdir().unwrap();
        let users: Store<User> = Store::open(dir.path(), "users", "pw", 1024 * 1024).unwrap();
        let groups: Store<Group> = Store::open(dir.path(), "groups", "pw", 1024 * 1024).unwrap();
        let sections: Store<Section> = Store::open(dir.path(), "sections", "pw", 1024 * 1024).unwrap();
        sections.try_add(section("mp3", "/mp3")).unwrap();
        sections.try_add(section("mp3-dup", "/mp3")).unwrap();
        groups
            .try_add(group("release", vec!["ghost-user"], BTreeMap::new()))
            .unwrap();

        let report = repair(&users, &groups, &sections).unwrap();
        assert_eq!(sections.len(), 1);
        assert!(groups.find("release").unwrap().users.is_empty());
        assert!(!report.actions_taken.is_empty());
    }
}
