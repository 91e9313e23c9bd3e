//! Little-endian, length-prefixed UTF-8 string helpers shared by every
//! record codec (§6.1).

use amftpd_core::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

/// Append a `u16`-length-prefixed UTF-8 string.
pub fn write_str(out: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    out.write_u16::<LittleEndian>(bytes.len() as u16).expect("Vec write is infallible");
    out.write_all(bytes).expect("Vec write is infallible");
}

/// Read a `u16`-length-prefixed UTF-8 string, failing with
/// `InvalidRecord` if the declared length overruns the buffer or the
/// bytes are not valid UTF-8.
pub fn read_str(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let len = cursor
        .read_u16::<LittleEndian>()
        .map_err(|e| Error::InvalidRecord(format!("truncated length prefix: {e}")))? as usize;
    read_str_of_len(cursor, len)
}

fn read_str_of_len(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<String> {
    let pos = cursor.position() as usize;
    let buf = cursor.get_ref();
    if pos + len > buf.len() {
        return Err(Error::InvalidRecord(format!(
            "declared string length {len} overruns record ({} bytes remaining)",
            buf.len().saturating_sub(pos)
        )));
    }
    let slice = &buf[pos..pos + len];
    let s = std::str::from_utf8(slice)
        .map_err(|e| Error::InvalidRecord(format!("invalid UTF-8 in record: {e}")))?
        .to_string();
    cursor.set_position((pos + len) as u64);
    Ok(s)
}

pub fn read_i32(cursor: &mut Cursor<&[u8]>) -> Result<i32> {
    cursor
        .read_i32::<LittleEndian>()
        .map_err(|e| Error::InvalidRecord(format!("truncated i32 field: {e}")))
}

pub fn read_i64(cursor: &mut Cursor<&[u8]>) -> Result<i64> {
    cursor
        .read_i64::<LittleEndian>()
        .map_err(|e| Error::InvalidRecord(format!("truncated i64 field: {e}")))
}

pub fn read_u16(cursor: &mut Cursor<&[u8]>) -> Result<u16> {
    cursor
        .read_u16::<LittleEndian>()
        .map_err(|e| Error::InvalidRecord(format!("truncated u16 field: {e}")))
}

pub fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8> {
    cursor
        .read_u8()
        .map_err(|e| Error::InvalidRecord(format!("truncated u8 field: {e}")))
}

pub fn read_bool(cursor: &mut Cursor<&[u8]>) -> Result<bool> {
    Ok(read_u8(cursor)? != 0)
}

pub fn read_f64(cursor: &mut Cursor<&[u8]>) -> Result<f64> {
    cursor
        .read_f64::<LittleEndian>()
        .map_err(|e| Error::InvalidRecord(format!("truncated f64 field: {e}")))
}
