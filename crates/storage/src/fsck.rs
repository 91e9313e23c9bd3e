//! Single-store structural check (§4.6): validates the salt, snapshot,
//! and WAL files without mutating anything or needing a live `Store<T>`.

use crate::record::Record;
use amftpd_core::Result;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::path::Path;

const WAL_AAD: &[u8] = b"amftpd-wal-v1";
const SNAPSHOT_AAD: &[u8] = b"amftpd-snapshot-v1";

/// Findings from checking one store's three files.
#[derive(Debug, Default, Clone)]
pub struct FsckReport {
    /// Problems that indicate actual data loss or corruption.
    pub errors: Vec<String>,
    /// Problems that are expected in normal operation (an empty store,
    /// a crash-truncated WAL tail) or otherwise non-fatal.
    pub warnings: Vec<String>,
}

impl FsckReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check the `<store_name>.salt`, `.db`, and `.wal` files inside `dir`.
pub fn fsck_store<T: Record>(dir: &Path, store_name: &str, master_password: &str) -> Result<FsckReport> {
    let mut report = FsckReport::default();

    let salt_path = dir.join(format!("{store_name}.salt"));
    let snapshot_path = dir.join(format!("{store_name}.db"));
    let wal_path = dir.join(format!("{store_name}.wal"));

    let snapshot_bytes = std::fs::read(&snapshot_path).ok();
    let snapshot_nonempty = snapshot_bytes.as_ref().map(|b| !b.is_empty()).unwrap_or(false);

    let salt = match std::fs::read(&salt_path) {
        Ok(bytes) if bytes.len() == amftpd_crypto::KEY_LEN => {
            let mut salt = [0u8; amftpd_crypto::KEY_LEN];
            salt.copy_from_slice(&bytes);
            Some(salt)
        }
        Ok(bytes) => {
            report
                .errors
                .push(format!("salt file has unexpected length {} (want {})", bytes.len(), amftpd_crypto::KEY_LEN));
            None
        }
        Err(_) if snapshot_nonempty => {
            report.errors.push("salt file missing but snapshot is non-empty".to_string());
            None
        }
        Err(_) => {
            report.warnings.push("salt file missing; store has never been written to".to_string());
            None
        }
    };

    let key = salt.map(|s| amftpd_crypto::derive_key(master_password, &s));

    if let (Some(key), Some(bytes)) = (key, snapshot_bytes) {
        if bytes.is_empty() {
            report.warnings.push("snapshot file is empty".to_string());
        } else {
            check_snapshot::<T>(&key, &bytes, &mut report);
        }
    }

    if let Ok(bytes) = std::fs::read(&wal_path) {
        if let Some(key) = key {
            check_wal(&key, &bytes, &mut report);
        } else if !bytes.is_empty() {
            report.errors.push("WAL file present but salt is unreadable, cannot verify".to_string());
        }
    }

    Ok(report)
}

fn check_snapshot<T: Record>(key: &[u8; amftpd_crypto::KEY_LEN], bytes: &[u8], report: &mut FsckReport) {
    let compressed = match amftpd_crypto::open(key, SNAPSHOT_AAD, bytes) {
        Ok(c) => c,
        Err(e) => {
            report.errors.push(format!("snapshot failed to decrypt: {e}"));
            return;
        }
    };
    let body = match amftpd_crypto::lz4::decompress(&compressed) {
        Ok(b) => b,
        Err(e) => {
            report.errors.push(format!("snapshot failed to decompress: {e}"));
            return;
        }
    };

    let mut cursor = Cursor::new(body.as_slice());
    let count = match cursor.read_u32::<LittleEndian>() {
        Ok(c) => c,
        Err(e) => {
            report.errors.push(format!("snapshot missing record count: {e}"));
            return;
        }
    };

    for i in 0..count {
        let len = match cursor.read_u32::<LittleEndian>() {
            Ok(l) => l as usize,
            Err(e) => {
                report.errors.push(format!("record {i} missing length prefix: {e}"));
                return;
            }
        };
        let mut buf = vec![0u8; len];
        if cursor.read_exact(&mut buf).is_err() {
            report.errors.push(format!("record {i} declares length {len} past end of snapshot"));
            return;
        }
        match T::decode(&buf) {
            Ok(Some(_)) => {}
            Ok(None) => report.warnings.push(format!("record {i} has an unrecognized type, would be skipped on load")),
            Err(e) => report.errors.push(format!("record {i} is malformed: {e}")),
        }
    }

    if cursor.position() != body.len() as u64 {
        report.errors.push("snapshot has trailing bytes past its declared records".to_string());
    }
}

fn check_wal(key: &[u8; amftpd_crypto::KEY_LEN], bytes: &[u8], report: &mut FsckReport) {
    let mut cursor = Cursor::new(bytes);
    let mut index = 0usize;
    loop {
        let start = cursor.position() as usize;
        let len = match cursor.read_u32::<LittleEndian>() {
            Ok(l) => l as usize,
            Err(_) if cursor.position() as usize == start => break, // clean EOF between frames
            Err(_) => {
                report.warnings.push(format!("WAL frame {index} truncated mid-length-prefix, ignored as a crash tail"));
                break;
            }
        };
        let mut frame = vec![0u8; len];
        if cursor.read_exact(&mut frame).is_err() {
            report
                .warnings
                .push(format!("WAL frame {index} truncated mid-frame, ignored as a crash tail"));
            break;
        }

        match amftpd_crypto::open(key, WAL_AAD, &frame) {
            Ok(compressed) => match amftpd_crypto::lz4::decompress(&compressed) {
                Ok(plaintext) if plaintext.is_empty() => {
                    report.errors.push(format!("WAL frame {index} decoded to an empty payload"));
                }
                Ok(plaintext) => {
                    if amftpd_core::WalEntryKind::from_byte(plaintext[0]).is_none() {
                        report.errors.push(format!("WAL frame {index} has an unknown entry kind byte {}", plaintext[0]));
                    }
                }
                Err(e) => report.errors.push(format!("WAL frame {index} failed to decompress: {e}")),
            },
            Err(e) => report.errors.push(format!("WAL frame {index} failed to decrypt: {e}")),
        }
        index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use amftpd_core::{RecordStore, Section};
    use tempfile::tempdir;

    fn section(name: &str) -> Section {
        Section {
            name: name.to_string(),
            virtual_root: "/".into(),
            free_leech: false,
            ratio_upload_unit: 1,
            ratio_download_unit: 1,
            nuke_multiplier: None,
        }
    }

    #[test]
    fn fresh_store_reports_only_warnings() {
        let dir = tempdir().unwrap();
        {
            let store: Store<Section> = Store::open(dir.path(), "sections", "pw", 1024 * 1024).unwrap();
            store.try_add(section("default")).unwrap();
        }
        let report = fsck_store::<Section>(dir.path(), "sections", "pw").unwrap();
        assert!(report.is_clean(), "unexpected errors: {:?}", report.errors);
    }

    #[test]
    fn corrupt_snapshot_is_reported_as_an_error() {
        let dir = tempdir().unwrap();
        {
            let store: Store<Section> = Store::open(dir.path(), "sections", "pw", 1024 * 1024).unwrap();
            store.try_add(section("default")).unwrap();
            store.force_rewrite().unwrap();
        }
        let snapshot_path = dir.path().join("sections.db");
        let mut bytes = std::fs::read(&snapshot_path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&snapshot_path, &bytes).unwrap();

        let report = fsck_store::<Section>(dir.path(), "sections", "pw").unwrap();
        assert!(!report.is_clean());
    }

    #[test]
    fn missing_store_is_all_warnings() {
        let dir = tempdir().unwrap();
        let report = fsck_store::<Section>(dir.path(), "sections", "pw").unwrap();
        assert!(report.is_clean());
        assert!(!report.warnings.is_empty());
    }
}
