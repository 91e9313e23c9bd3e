//! Domain entities: users, groups, and sections.
//!
//! These are plain value types. Serialization to the on-disk record
//! layouts lives in `amftpd-storage`, which keeps this crate free of any
//! byte-format concerns.

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Returns true if `a` and `b` are equal under ASCII case folding, the
/// comparison every store key uses (invariant 1 in the data model).
pub fn names_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

bitflags::bitflags! {
    /// Boolean permission flags packed into the `i32 flags` field of a
    /// user record (§6.1).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UserFlags: i32 {
        const ADMIN = 1 << 0;
        const FXP = 1 << 1;
        const UPLOAD = 1 << 2;
        const DOWNLOAD = 1 << 3;
        const ACTIVE_MODE = 1 << 4;
        const REQUIRE_IDENT = 1 << 5;
    }
}

/// A scene user account.
///
/// `flags_raw` is the single wire-level `i32` the on-disk record stores
/// (§6.1): bits 0-5 are the named permissions, any higher bit is opaque
/// and preserved round-trip without interpretation. `secondary_groups`
/// has no slot in the documented wire layout, which persists only
/// `primary_group` — see the open-question resolution in DESIGN.md. It
/// is kept here as a runtime-only field (always empty immediately after
/// a load) so collaborators that already depend on its presence do not
/// need a second, near-identical type.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// Unique, case-insensitively compared account name.
    pub name: String,
    pub password_hash: String,
    pub home_dir: String,
    pub flags_raw: i32,
    pub max_concurrent_logins: i32,
    pub idle_timeout_sec: i32,
    pub max_up_kbps: i32,
    pub max_down_kbps: i32,
    pub credits_kb: i64,
    pub primary_group: Option<String>,
    pub secondary_groups: Vec<String>,
    pub allowed_ip_mask: Option<String>,
    pub required_ident: Option<String>,
}

impl User {
    /// Credits value used for the bootstrap admin account: unlimited.
    pub const UNLIMITED_CREDITS: i64 = i64::MAX;

    pub fn flags(&self) -> UserFlags {
        UserFlags::from_bits_truncate(self.flags_raw)
    }

    pub fn is_admin(&self) -> bool {
        self.flags().contains(UserFlags::ADMIN)
    }

    /// Reject names that cannot round-trip through the wire layout or
    /// the case-insensitive key space.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::ValidationError("user name must not be empty".into()));
        }
        if self.name.contains('\0') {
            return Err(Error::ValidationError("user name must not contain NUL".into()));
        }
        Ok(())
    }
}

/// A scene group: a named collection of users with per-section credit grants.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub name: String,
    pub description: String,
    pub users: Vec<String>,
    /// section name -> credits_kb granted to members of this group.
    pub section_credits: BTreeMap<String, i64>,
}

impl Group {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::ValidationError("group name must not be empty".into()));
        }
        if self.name.contains('\0') {
            return Err(Error::ValidationError("group name must not contain NUL".into()));
        }
        Ok(())
    }

    /// Deduplicate member names, keeping the first occurrence's casing.
    pub fn dedup_users(&mut self) {
        let mut seen: Vec<String> = Vec::with_capacity(self.users.len());
        for u in self.users.drain(..).collect::<Vec<_>>() {
            if !seen.iter().any(|s| names_eq(s, &u)) {
                seen.push(u);
            }
        }
        self.users = seen;
    }
}

/// A virtual scene section (e.g. `/MP3`, `/GAMES`).
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub name: String,
    pub virtual_root: String,
    pub free_leech: bool,
    pub ratio_upload_unit: i32,
    pub ratio_download_unit: i32,
    pub nuke_multiplier: Option<f64>,
}

impl Section {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::ValidationError("section name must not be empty".into()));
        }
        if !self.virtual_root.starts_with('/') {
            return Err(Error::ValidationError(format!(
                "section {:?} virtual_root must start with '/': {:?}",
                self.name, self.virtual_root
            )));
        }
        Ok(())
    }

    /// Normalize a raw virtual root: backslashes become slashes, and a
    /// leading slash is prepended if missing (invariant 4).
    pub fn normalize_virtual_root(raw: &str) -> String {
        let mut s = raw.replace('\\', "/");
        if !s.starts_with('/') {
            s = format!("/{s}");
        }
        s
    }
}
