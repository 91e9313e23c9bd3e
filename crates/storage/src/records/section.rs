//! Section record wire layout (§6.1).

use crate::bytes::{read_bool, read_f64, read_i32, read_u16};
use crate::record::Record;
use amftpd_core::{Error, Result, Section, WalEntryKind};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Cursor;

impl Record for Section {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_u16::<LittleEndian>(self.name.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(self.virtual_root.len() as u16).unwrap();

        out.push(self.free_leech as u8);
        out.write_i32::<LittleEndian>(self.ratio_upload_unit).unwrap();
        out.write_i32::<LittleEndian>(self.ratio_download_unit).unwrap();

        out.push(self.nuke_multiplier.is_some() as u8);
        if let Some(mult) = self.nuke_multiplier {
            out.write_f64::<LittleEndian>(mult).unwrap();
        }

        out.extend_from_slice(self.name.as_bytes());
        out.extend_from_slice(self.virtual_root.as_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Result<Option<Self>> {
        let mut cursor = Cursor::new(bytes);
        let name_len = read_u16(&mut cursor)?;
        let root_len = read_u16(&mut cursor)?;

        let free_leech = read_bool(&mut cursor)?;
        let ratio_upload_unit = read_i32(&mut cursor)?;
        let ratio_download_unit = read_i32(&mut cursor)?;

        let has_nuke_mult = read_bool(&mut cursor)?;
        let nuke_multiplier = if has_nuke_mult { Some(read_f64(&mut cursor)?) } else { None };

        let name = read_exact_str(&mut cursor, name_len)?;
        let virtual_root = read_exact_str(&mut cursor, root_len)?;

        Ok(Some(Section {
            name,
            virtual_root,
            free_leech,
            ratio_upload_unit,
            ratio_download_unit,
            nuke_multiplier,
        }))
    }

    fn add_kind() -> WalEntryKind {
        WalEntryKind::AddSection
    }

    fn update_kind() -> WalEntryKind {
        WalEntryKind::UpdateSection
    }

    fn delete_kind() -> WalEntryKind {
        WalEntryKind::DeleteSection
    }

    fn normalize(&mut self) {
        self.virtual_root = Section::normalize_virtual_root(&self.virtual_root);
    }

    fn validate(&self) -> Result<()> {
        Section::validate(self)
    }
}

fn read_exact_str(cursor: &mut Cursor<&[u8]>, len: u16) -> Result<String> {
    let pos = cursor.position() as usize;
    let buf = *cursor.get_ref();
    let len = len as usize;
    if pos + len > buf.len() {
        return Err(Error::InvalidRecord("declared length overruns section record".into()));
    }
    let s = std::str::from_utf8(&buf[pos..pos + len])
        .map_err(|e| Error::InvalidRecord(format!("invalid UTF-8 in section record: {e}")))?
        .to_string();
    cursor.set_position((pos + len) as u64);
    Ok(s)
}
