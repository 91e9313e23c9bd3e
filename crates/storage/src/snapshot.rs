//! Snapshot framing and sealing (§4.4, §6.1).
//!
//! A snapshot file's plaintext body is `count_u32 || { len_u32 ||
//! record_bytes }*`. The whole body is LZ4-compressed, then AEAD-sealed.
//! Loading tolerates individual unknown record types (skipped with a
//! warning, per `Record::decode`'s contract) but treats an AEAD or LZ4
//! failure on the outer frame as corruption, recoverable by falling
//! back to an empty in-memory store (§4.4's corruption-recovery path).

use crate::record::Record;
use amftpd_core::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};
use std::path::Path;

const AAD: &[u8] = b"amftpd-snapshot-v1";

/// Minimum plausible AEAD frame size (nonce + tag), used to distinguish
/// "file doesn't exist yet" from "file exists but is too short to be
/// anything but corrupt" during corruption recovery.
const MIN_FRAME_LEN: usize = 12 + 16;

fn encode_body<T: Record>(records: &[T]) -> Vec<u8> {
    let mut body = Vec::new();
    body.write_u32::<LittleEndian>(records.len() as u32).unwrap();
    for record in records {
        let bytes = record.encode();
        body.write_u32::<LittleEndian>(bytes.len() as u32).unwrap();
        body.extend_from_slice(&bytes);
    }
    body
}

fn decode_body<T: Record>(body: &[u8]) -> Result<Vec<T>> {
    let mut cursor = Cursor::new(body);
    let count = cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| Error::SnapshotCorrupt(format!("missing record count: {e}")))?;

    let mut records = Vec::with_capacity(count as usize);
    for i in 0..count {
        let len = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::SnapshotCorrupt(format!("record {i} missing length prefix: {e}")))?
            as usize;
        let mut buf = vec![0u8; len];
        cursor
            .read_exact(&mut buf)
            .map_err(|e| Error::SnapshotCorrupt(format!("record {i} truncated: {e}")))?;
        match T::decode(&buf)? {
            Some(record) => records.push(record),
            None => tracing::warn!(index = i, "skipping record of unrecognized type"),
        }
    }
    Ok(records)
}

/// Seal a snapshot body for writing to disk.
pub fn seal_snapshot<T: Record>(
    key: &[u8; amftpd_crypto::KEY_LEN],
    records: &[T],
) -> Result<Vec<u8>> {
    let body = encode_body(records);
    let compressed = amftpd_crypto::lz4::compress(&body);
    amftpd_crypto::seal(key, AAD, &compressed)
}

/// Outcome of loading a snapshot file.
pub enum LoadedSnapshot<T> {
    /// No snapshot file exists yet; start from an empty store.
    Absent,
    /// Snapshot decoded successfully.
    Records(Vec<T>),
    /// Snapshot existed but failed to decrypt or decompress; the store
    /// should fall back to an empty in-memory map and let a future
    /// mutation or `force_rewrite` produce a fresh, valid snapshot.
    Corrupt(Error),
}

/// Load and decode the snapshot at `path`, if any.
pub fn load_snapshot<T: Record>(path: &Path, key: &[u8; amftpd_crypto::KEY_LEN]) -> Result<LoadedSnapshot<T>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LoadedSnapshot::Absent),
        Err(e) => return Err(Error::Io(e)),
    };

    if bytes.len() < MIN_FRAME_LEN {
        return Ok(LoadedSnapshot::Absent);
    }

    let compressed = match amftpd_crypto::open(key, AAD, &bytes) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(path = ?path, error = %e, "snapshot failed to decrypt, falling back to bootstrap defaults");
            return Ok(LoadedSnapshot::Corrupt(e));
        }
    };
    let body = match amftpd_crypto::lz4::decompress(&compressed) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(path = ?path, error = %e, "snapshot failed to decompress, falling back to bootstrap defaults");
            return Ok(LoadedSnapshot::Corrupt(e));
        }
    };
    match decode_body::<T>(&body) {
        Ok(records) => Ok(LoadedSnapshot::Records(records)),
        Err(e) => {
            tracing::error!(path = ?path, error = %e, "snapshot body malformed, falling back to bootstrap defaults");
            Ok(LoadedSnapshot::Corrupt(e))
        }
    }
}

/// Atomically write a fresh snapshot.
pub fn write_snapshot<T: Record>(
    path: &Path,
    key: &[u8; amftpd_crypto::KEY_LEN],
    records: &[T],
) -> Result<()> {
    let sealed = seal_snapshot(key, records)?;
    amftpd_crypto::write_atomic(path, &sealed)?;
    Ok(())
}
