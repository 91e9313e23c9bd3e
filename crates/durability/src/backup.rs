//! Password-encrypted, compressed portable backup files (§4.8, §6.3).
//!
//! Layout: `"AMFTPBK1" || salt[32] || nonce[12] || ciphertext || tag[16]`.
//! The ciphertext is the LZ4-compressed raw store file, sealed under a
//! key derived from the backup password and the backup's own salt —
//! independent of the store's own on-disk salt, so a backup remains
//! restorable even if the live store's salt is later rotated.

use amftpd_core::{Error, Result};
use std::path::Path;

/// Backup file magic (§6.3).
pub const MAGIC: &[u8; 8] = b"AMFTPBK1";

const AAD: &[u8] = b"amftpd-backup-v1";

/// Build a backup file's bytes from a store file already on disk.
pub fn backup(store_file: &Path, password: &str) -> Result<Vec<u8>> {
    let raw = std::fs::read(store_file)?;
    backup_bytes(&raw, password)
}

/// Build a backup file's bytes from raw store-file content directly
/// (used by `DatabaseManager::backup_*`, which already holds the bytes
/// in memory rather than re-reading the file it just wrote).
pub fn backup_bytes(raw_store_bytes: &[u8], password: &str) -> Result<Vec<u8>> {
    let salt = amftpd_crypto::aead::random_salt();
    let key = amftpd_crypto::derive_key(password, &salt);
    let compressed = amftpd_crypto::lz4::compress(raw_store_bytes);
    let sealed = amftpd_crypto::seal(&key, AAD, &compressed)?;

    let mut out = Vec::with_capacity(MAGIC.len() + salt.len() + sealed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypt a backup file's bytes, returning the raw store-file content
/// it was made from. Does not touch disk.
pub fn decrypt(backup_bytes: &[u8], password: &str) -> Result<Vec<u8>> {
    if backup_bytes.len() < MAGIC.len() + amftpd_crypto::KEY_LEN {
        return Err(Error::BackupFormatInvalid);
    }
    let (magic, rest) = backup_bytes.split_at(MAGIC.len());
    if magic != MAGIC {
        return Err(Error::BackupFormatInvalid);
    }
    let (salt_bytes, sealed) = rest.split_at(amftpd_crypto::KEY_LEN);
    let mut salt = [0u8; amftpd_crypto::KEY_LEN];
    salt.copy_from_slice(salt_bytes);

    let key = amftpd_crypto::derive_key(password, &salt);
    let compressed = amftpd_crypto::open(&key, AAD, sealed).map_err(|_| Error::BackupFormatInvalid)?;
    amftpd_crypto::lz4::decompress(&compressed).map_err(|_| Error::BackupFormatInvalid)
}

/// Decrypt a backup and atomically write its content over `target`,
/// returning the written bytes.
pub fn restore(target: &Path, password: &str, backup_bytes: &[u8]) -> Result<Vec<u8>> {
    let raw = decrypt(backup_bytes, password)?;
    amftpd_crypto::write_atomic(target, &raw)?;
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_restore_round_trip_is_a_no_op_on_content() {
        let original = b"pretend this is an encrypted snapshot file".to_vec();
        let bk = backup_bytes(&original, "backup-pw").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("users.db");
        std::fs::write(&target, b"stale content").unwrap();
        let restored = restore(&target, "backup-pw", &bk).unwrap();
        assert_eq!(restored, original);
        assert_eq!(std::fs::read(&target).unwrap(), original);
    }

    #[test]
    fn wrong_password_is_invalid_or_wrong_password() {
        let bk = backup_bytes(b"data", "correct").unwrap();
        assert!(matches!(decrypt(&bk, "wrong"), Err(Error::BackupFormatInvalid)));
    }

    #[test]
    fn bad_magic_is_invalid() {
        let mut bk = backup_bytes(b"data", "pw").unwrap();
        bk[0] = b'X';
        assert!(matches!(decrypt(&bk, "pw"), Err(Error::BackupFormatInvalid)));
    }

    #[test]
    fn truncated_file_is_invalid() {
        assert!(matches!(decrypt(b"AMFTPBK1", "pw"), Err(Error::BackupFormatInvalid)));
    }
}
