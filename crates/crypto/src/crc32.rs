//! CRC32 helpers used by zipscript CRC verification and by Fsck's
//! snapshot footer checks.

use std::io::Read;
use std::path::Path;

/// CRC32 (IEEE) of an in-memory buffer.
pub fn crc32_bytes(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// CRC32 (IEEE) of a file's contents, streamed in fixed-size chunks so
/// large release files don't need to be loaded whole.
pub fn crc32_file(path: &Path) -> std::io::Result<u32> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}
