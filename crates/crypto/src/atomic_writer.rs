//! Durable whole-file replace: write-fsync-rename, twice.
//!
//! Renaming directly over an existing file has filesystem-dependent
//! semantics, so this goes through an intermediate `.atomic` file: the
//! new content is staged and fsynced, then swapped into place via two
//! renames. At any point during a crash, `path` either still holds its
//! prior content or already holds the new content in full — never a
//! partial write.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Atomically replace the contents of `path` with `bytes`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension(tmp_ext(path));
    let atomic_path = path.with_extension(atomic_ext(path));

    {
        let mut tmp = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp_path)?;
        tmp.write_all(bytes)?;
        tmp.sync_all()?;
    }

    if atomic_path.exists() {
        fs::remove_file(&atomic_path)?;
    }
    fs::rename(&tmp_path, &atomic_path)?;

    if path.exists() {
        fs::remove_file(path)?;
    }
    fs::rename(&atomic_path, path)?;

    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

fn tmp_ext(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{ext}.tmp"),
        None => "tmp".to_string(),
    }
}

fn atomic_ext(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{ext}.atomic"),
        None => "atomic".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn replaces_existing_content_wholesale() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        write_atomic(&path, b"first").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"first");
        write_atomic(&path, b"second, longer payload").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second, longer payload");
    }

    #[test]
    fn creates_file_that_did_not_exist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("new.db");
        write_atomic(&path, b"hello").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn leaves_no_staging_files_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        write_atomic(&path, b"data").unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("store.db")]);
    }
}
