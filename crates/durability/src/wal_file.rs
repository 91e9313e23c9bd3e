//! Append-only encrypted log of typed WAL entries (§4.3, §6.2).
//!
//! On-disk layout: a sequence of frames `len_le_u32 || aead_frame`,
//! where `aead_frame` decrypts and LZ4-decompresses to
//! `kind_byte || payload`. Appends are exclusive, fsynced before
//! returning, and all-or-nothing within a frame: a crash mid-append
//! leaves a truncated tail that `read_all` skips with a warning rather
//! than treats as an error.

use amftpd_core::{Error, Result, WalEntry, WalEntryKind};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

const AAD: &[u8] = b"amftpd-wal-v1";

/// Default compaction threshold (§4.3): rewrite the snapshot and clear
/// the WAL once it grows past this many bytes.
pub const DEFAULT_MAX_WAL_BYTES: u64 = 5 * 1024 * 1024;

/// A single store's write-ahead log.
pub struct WalFile {
    path: PathBuf,
    key: [u8; amftpd_crypto::KEY_LEN],
    max_wal_bytes: u64,
    file: File,
}

impl WalFile {
    /// Open (creating if absent) the WAL file at `path`.
    pub fn open(path: &Path, key: [u8; amftpd_crypto::KEY_LEN], max_wal_bytes: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            key,
            max_wal_bytes,
            file,
        })
    }

    /// Append one entry: serialize, LZ4-compress, AEAD-seal, length-prefix,
    /// write, fsync. The in-memory mutation must not be applied by the
    /// caller until this returns `Ok`.
    pub fn append(&mut self, entry: &WalEntry) -> Result<()> {
        let mut plaintext = Vec::with_capacity(1 + entry.payload.len());
        plaintext.push(entry.kind.as_byte());
        plaintext.extend_from_slice(&entry.payload);

        let compressed = amftpd_crypto::lz4::compress(&plaintext);
        let sealed = amftpd_crypto::seal(&self.key, AAD, &compressed)?;

        let mut frame = Vec::with_capacity(4 + sealed.len());
        frame.write_u32::<LittleEndian>(sealed.len() as u32)?;
        frame.extend_from_slice(&sealed);

        self.file.write_all(&frame)?;
        self.file.sync_all()?;
        tracing::debug!(kind = ?entry.kind, bytes = frame.len(), "wal append");
        Ok(())
    }

    /// Lazily replay every entry that decodes cleanly. Stops (without
    /// error) at a truncated trailing frame, and halts at the first
    /// frame whose AEAD verification fails, since a bad tag means a key
    /// mismatch or corruption that cannot be safely interpreted further.
    pub fn read_all(&self) -> Result<Vec<WalEntry>> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(Error::Io(e)),
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut frame = vec![0u8; len];
            if reader.read_exact(&mut frame).is_err() {
                tracing::warn!(wal = ?self.path, "truncated trailing WAL frame, stopping replay");
                break;
            }

            let compressed = match amftpd_crypto::open(&self.key, AAD, &frame) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(wal = ?self.path, error = %e, "WAL frame failed to decrypt, halting replay");
                    break;
                }
            };
            let plaintext = match amftpd_crypto::lz4::decompress(&compressed) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(wal = ?self.path, error = %e, "WAL frame failed to decompress, halting replay");
                    break;
                }
            };
            if plaintext.is_empty() {
                tracing::warn!(wal = ?self.path, "empty WAL frame payload, halting replay");
                break;
            }
            let kind = match WalEntryKind::from_byte(plaintext[0]) {
                Some(k) => k,
                None => {
                    tracing::warn!(wal = ?self.path, byte = plaintext[0], "unknown WAL entry kind, halting replay");
                    break;
                }
            };
            entries.push(WalEntry::new(kind, plaintext[1..].to_vec()));
        }
        Ok(entries)
    }

    /// Delete the WAL file after a successful compaction.
    pub fn clear(&mut self) -> Result<()> {
        // Reopen is necessary because `create(true).append(true)` would
        // otherwise keep appending to the now-deleted inode's old contents.
        drop(std::mem::replace(
            &mut self.file,
            OpenOptions::new().create(true).append(true).read(true).open(&self.path)?,
        ));
        std::fs::remove_file(&self.path)?;
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&self.path)?;
        Ok(())
    }

    /// True once the file has grown past the configured compaction
    /// threshold.
    pub fn needs_compaction(&self) -> bool {
        std::fs::metadata(&self.path)
            .map(|m| m.len() > self.max_wal_bytes)
            .unwrap_or(false)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amftpd_core::WalEntryKind;
    use tempfile::tempdir;

    fn key() -> [u8; amftpd_crypto::KEY_LEN] {
        amftpd_crypto::derive_key("pw", &[3u8; amftpd_crypto::KEY_LEN])
    }

    #[test]
    fn append_then_read_all_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.wal");
        let mut wal = WalFile::open(&path, key(), DEFAULT_MAX_WAL_BYTES).unwrap();
        wal.append(&WalEntry::new(WalEntryKind::AddUser, b"alice-record".to_vec())).unwrap();
        wal.append(&WalEntry::new(WalEntryKind::DeleteUser, b"alice".to_vec())).unwrap();

        let entries = wal.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, WalEntryKind::AddUser);
        assert_eq!(entries[0].payload, b"alice-record");
        assert_eq!(entries[1].kind, WalEntryKind::DeleteUser);
    }

    #[test]
    fn clear_removes_all_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("groups.wal");
        let mut wal = WalFile::open(&path, key(), DEFAULT_MAX_WAL_BYTES).unwrap();
        wal.append(&WalEntry::new(WalEntryKind::AddGroup, b"g".to_vec())).unwrap();
        wal.clear().unwrap();
        assert!(wal.read_all().unwrap().is_empty());
    }

    #[test]
    fn needs_compaction_respects_threshold() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sections.wal");
        let mut wal = WalFile::open(&path, key(), 16).unwrap();
        assert!(!wal.needs_compaction());
        wal.append(&WalEntry::new(WalEntryKind::AddSection, vec![0u8; 64])).unwrap();
        assert!(wal.needs_compaction());
    }

    #[test]
    fn truncated_trailing_frame_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.wal");
        let mut wal = WalFile::open(&path, key(), DEFAULT_MAX_WAL_BYTES).unwrap();
        wal.append(&WalEntry::new(WalEntryKind::AddUser, b"full-record".to_vec())).unwrap();
        drop(wal);

        // Simulate a crash mid-append: truncate a few bytes off the tail.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 3);
        std::fs::write(&path, &bytes).unwrap();

        let wal = WalFile::open(&path, key(), DEFAULT_MAX_WAL_BYTES).unwrap();
        assert!(wal.read_all().unwrap().is_empty());
    }

    #[test]
    fn wrong_key_halts_replay_without_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.wal");
        let mut wal = WalFile::open(&path, key(), DEFAULT_MAX_WAL_BYTES).unwrap();
        wal.append(&WalEntry::new(WalEntryKind::AddUser, b"x".to_vec())).unwrap();
        drop(wal);

        let other_key = amftpd_crypto::derive_key("different", &[3u8; amftpd_crypto::KEY_LEN]);
        let wal = WalFile::open(&path, other_key, DEFAULT_MAX_WAL_BYTES).unwrap();
        assert!(wal.read_all().unwrap().is_empty());
    }
}
