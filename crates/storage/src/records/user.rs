//! User record wire layout (§6.1).

use crate::bytes::{read_i32, read_i64, read_u16};
use crate::record::Record;
use amftpd_core::{Error, Result, User, WalEntryKind};
use byteorder::{LittleEndian, WriteBytesExt};
use std::collections::HashMap;
use std::io::Cursor;

/// The only record-type byte this build understands (§9: "kept as an
/// explicit field to allow evolution to other user kinds").
const RECORD_TYPE_STANDARD: u8 = 0;

impl Record for User {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self) -> Vec<u8> {
        let group = self.primary_group.clone().unwrap_or_default();
        let ip = self.allowed_ip_mask.clone().unwrap_or_default();
        let ident = self.required_ident.clone().unwrap_or_default();

        let mut out = Vec::new();
        out.push(RECORD_TYPE_STANDARD);

        // length prefixes, in field order
        out.write_u16::<LittleEndian>(self.name.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(self.password_hash.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(self.home_dir.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(group.len() as u16).unwrap();

        out.write_i32::<LittleEndian>(self.flags_raw).unwrap();
        out.write_i32::<LittleEndian>(self.max_concurrent_logins).unwrap();
        out.write_i32::<LittleEndian>(self.idle_timeout_sec).unwrap();
        out.write_i32::<LittleEndian>(self.max_up_kbps).unwrap();
        out.write_i32::<LittleEndian>(self.max_down_kbps).unwrap();
        out.write_i64::<LittleEndian>(self.credits_kb).unwrap();

        out.write_u16::<LittleEndian>(ip.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(ident.len() as u16).unwrap();

        out.extend_from_slice(self.name.as_bytes());
        out.extend_from_slice(self.password_hash.as_bytes());
        out.extend_from_slice(self.home_dir.as_bytes());
        out.extend_from_slice(group.as_bytes());
        out.extend_from_slice(ip.as_bytes());
        out.extend_from_slice(ident.as_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Result<Option<Self>> {
        if bytes.is_empty() {
            return Err(Error::InvalidRecord("empty user record".into()));
        }
        let record_type = bytes[0];
        if record_type != RECORD_TYPE_STANDARD {
            tracing::warn!(record_type, "unknown user record type, skipping");
            return Ok(None);
        }

        let mut cursor = Cursor::new(&bytes[1..]);
        let name_len = read_u16(&mut cursor)?;
        let pass_len = read_u16(&mut cursor)?;
        let home_len = read_u16(&mut cursor)?;
        let group_len = read_u16(&mut cursor)?;

        let flags_raw = read_i32(&mut cursor)?;
        let max_concurrent_logins = read_i32(&mut cursor)?;
        let idle_timeout_sec = read_i32(&mut cursor)?;
        let max_up_kbps = read_i32(&mut cursor)?;
        let max_down_kbps = read_i32(&mut cursor)?;
        let credits_kb = read_i64(&mut cursor)?;

        let ip_len = read_u16(&mut cursor)?;
        let ident_len = read_u16(&mut cursor)?;

        let name = read_fixed_str(&mut cursor, name_len)?;
        let password_hash = read_fixed_str(&mut cursor, pass_len)?;
        let home_dir = read_fixed_str(&mut cursor, home_len)?;
        let group = read_fixed_str(&mut cursor, group_len)?;
        let ip = read_fixed_str(&mut cursor, ip_len)?;
        let ident = read_fixed_str(&mut cursor, ident_len)?;

        Ok(Some(User {
            name,
            password_hash,
            home_dir,
            flags_raw,
            max_concurrent_logins,
            idle_timeout_sec,
            max_up_kbps,
            max_down_kbps,
            credits_kb,
            primary_group: none_if_empty(group),
            secondary_groups: Vec::new(),
            allowed_ip_mask: none_if_empty(ip),
            required_ident: none_if_empty(ident),
        }))
    }

    fn add_kind() -> WalEntryKind {
        WalEntryKind::AddUser
    }

    fn update_kind() -> WalEntryKind {
        WalEntryKind::UpdateUser
    }

    fn delete_kind() -> WalEntryKind {
        WalEntryKind::DeleteUser
    }

    fn apply_rename(_map: &mut HashMap<String, Self>, _old_key: &str, _new_name: &str) -> Result<()> {
        unreachable!("users cannot be renamed")
    }

    fn validate(&self) -> Result<()> {
        User::validate(self)
    }
}

fn read_fixed_str(cursor: &mut Cursor<&[u8]>, len: u16) -> Result<String> {
    // Reuse the shared length-prefixed reader by re-encoding the already-read
    // length ahead of the cursor's current position would require rewinding;
    // simplest to just read `len` raw bytes directly here.
    let pos = cursor.position() as usize;
    let buf = *cursor.get_ref();
    let len = len as usize;
    if pos + len > buf.len() {
        return Err(Error::InvalidRecord(format!(
            "declared string length {len} overruns user record ({} bytes remaining)",
            buf.len().saturating_sub(pos)
        )));
    }
    let s = std::str::from_utf8(&buf[pos..pos + len])
        .map_err(|e| Error::InvalidRecord(format!("invalid UTF-8 in user record: {e}")))?
        .to_string();
    cursor.set_position((pos + len) as u64);
    Ok(s)
}

fn none_if_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
