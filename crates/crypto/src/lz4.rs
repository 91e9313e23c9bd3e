//! Block-format LZ4 compression used for snapshot bodies and WAL frame
//! plaintext. The block format (not LZ4's frame format) is used because
//! every caller already prefixes its own length field.

use amftpd_core::{Error, Result};

/// Compress `data` with LZ4 block compression, prefixing the
/// uncompressed length so `decompress` does not need it passed back in.
pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + data.len() / 2);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&lz4_flex::compress(data));
    out
}

/// Reverse [`compress`].
pub fn decompress(framed: &[u8]) -> Result<Vec<u8>> {
    if framed.len() < 4 {
        return Err(Error::DecompressFailed("frame shorter than length prefix".into()));
    }
    let (len_bytes, body) = framed.split_at(4);
    let uncompressed_len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
    lz4_flex::decompress(body, uncompressed_len)
        .map_err(|e| Error::DecompressFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_bytes() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(50);
        let framed = compress(&data);
        let back = decompress(&framed).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn round_trips_empty_input() {
        let framed = compress(&[]);
        assert_eq!(decompress(&framed).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn rejects_truncated_frame() {
        assert!(decompress(&[1, 2]).is_err());
    }
}
