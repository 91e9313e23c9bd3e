//! Group record wire layout (§6.1) and the `RenameGroup` WAL payload
//! (`"<old>|<new>"`, §6.2).

use crate::bytes::{read_i64, read_str, read_u16, write_str};
use crate::record::Record;
use amftpd_core::{Error, Group, Result, WalEntryKind};
use byteorder::{LittleEndian, WriteBytesExt};
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;

impl Record for Group {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_u16::<LittleEndian>(self.name.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(self.description.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(self.users.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(self.section_credits.len() as u16).unwrap();

        out.extend_from_slice(self.name.as_bytes());
        out.extend_from_slice(self.description.as_bytes());
        for u in &self.users {
            write_str(&mut out, u);
        }
        for (section, credits) in &self.section_credits {
            write_str(&mut out, section);
            out.write_i64::<LittleEndian>(*credits).unwrap();
        }
        out
    }

    fn decode(bytes: &[u8]) -> Result<Option<Self>> {
        let mut cursor = Cursor::new(bytes);
        let name_len = read_u16(&mut cursor)?;
        let desc_len = read_u16(&mut cursor)?;
        let user_count = read_u16(&mut cursor)?;
        let cred_count = read_u16(&mut cursor)?;

        let name = read_exact_str(&mut cursor, name_len)?;
        let description = read_exact_str(&mut cursor, desc_len)?;

        let mut users = Vec::with_capacity(user_count as usize);
        for _ in 0..user_count {
            users.push(read_str(&mut cursor)?);
        }

        let mut section_credits = BTreeMap::new();
        for _ in 0..cred_count {
            let section = read_str(&mut cursor)?;
            let credits = read_i64(&mut cursor)?;
            section_credits.insert(section, credits);
        }

        Ok(Some(Group {
            name,
            description,
            users,
            section_credits,
        }))
    }

    fn add_kind() -> WalEntryKind {
        WalEntryKind::AddGroup
    }

    fn update_kind() -> WalEntryKind {
        WalEntryKind::UpdateGroup
    }

    fn delete_kind() -> WalEntryKind {
        WalEntryKind::DeleteGroup
    }

    fn apply_rename(map: &mut HashMap<String, Self>, old_key: &str, new_name: &str) -> Result<()> {
        let mut group = map
            .remove(old_key)
            .ok_or_else(|| Error::NotFound(format!("group {old_key:?}")))?;
        group.name = new_name.to_string();
        map.insert(new_name.to_ascii_lowercase(), group);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        Group::validate(self)
    }
}

/// Encode a `"<old>|<new>"` rename payload (§3, §6.2). Names never
/// contain `|` after validation, so a single split is unambiguous.
pub fn encode_rename(old: &str, new: &str) -> Vec<u8> {
    format!("{old}|{new}").into_bytes()
}

/// Decode a `"<old>|<new>"` rename payload.
pub fn decode_rename(payload: &[u8]) -> Result<(String, String)> {
    let s = std::str::from_utf8(payload)
        .map_err(|e| Error::InvalidRecord(format!("rename payload is not UTF-8: {e}")))?;
    let (old, new) = s
        .split_once('|')
        .ok_or_else(|| Error::InvalidRecord("rename payload missing '|' separator".into()))?;
    Ok((old.to_string(), new.to_string()))
}

fn read_exact_str(cursor: &mut Cursor<&[u8]>, len: u16) -> Result<String> {
    let pos = cursor.position() as usize;
    let buf = *cursor.get_ref();
    let len = len as usize;
    if pos + len > buf.len() {
        return Err(Error::InvalidRecord("declared length overruns group record".into()));
    }
    let s = std::str::from_utf8(&buf[pos..pos + len])
        .map_err(|e| Error::InvalidRecord(format!("invalid UTF-8 in group record: {e}")))?
        .to_string();
    cursor.set_position((pos + len) as u64);
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Group {
        let mut credits = BTreeMap::new();
        credits.insert("MP3".to_string(), 1024);
        credits.insert("GAMES".to_string(), 0);
        Group {
            name: "admins".into(),
            description: "site staff".into(),
            users: vec!["alice".into(), "bob".into()],
            section_credits: credits,
        }
    }

    #[test]
    fn round_trips_a_full_record() {
        let g = sample();
        let encoded = Record::encode(&g);
        let decoded = Group::decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded, g);
    }

    #[test]
    fn round_trips_with_no_members_or_credits() {
        let g = Group {
            name: "empty".into(),
            description: String::new(),
            users: Vec::new(),
            section_credits: BTreeMap::new(),
        };
        let encoded = Record::encode(&g);
        let decoded = Group::decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded, g);
    }

    #[test]
    fn rename_payload_round_trips() {
        let payload = encode_rename("oldname", "newname");
        let (old, new) = decode_rename(&payload).unwrap();
        assert_eq!(old, "oldname");
        assert_eq!(new, "newname");
    }
}
