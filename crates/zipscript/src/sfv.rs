//! SFV manifest parsing (§4.9).
//!
//! Each non-empty, non-comment line is whitespace-split; the first
//! token is the file name, the last token its expected CRC32 as exactly
//! 8 hex digits. Lines that don't fit this shape are skipped silently —
//! SFV files in the wild carry stray comments and blank separators.

use crate::types::SfvEntry;

/// Parse an SFV manifest's text content into its entries.
pub fn parse_sfv(content: &str) -> Vec<SfvEntry> {
    content
        .lines()
        .filter_map(|line| parse_line(line.trim()))
        .collect()
}

fn parse_line(line: &str) -> Option<SfvEntry> {
    if line.is_empty() || line.starts_with(';') {
        return None;
    }
    let mut tokens = line.split_whitespace();
    let file_name = tokens.next()?;
    let crc_token = tokens.last()?;
    if crc_token.len() != 8 || !crc_token.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let expected_crc = u32::from_str_radix(crc_token, 16).ok()?;
    Some(SfvEntry {
        file_name: file_name.to_string(),
        expected_crc,
    })
}
