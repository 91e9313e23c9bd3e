//! Cryptographic and durability primitives shared by every store:
//! authenticated encryption with PBKDF2 key derivation, LZ4 framing,
//! CRC32 checksums, and the write-fsync-rename atomic file replace.

pub mod aead;
pub mod atomic_writer;
pub mod crc32;
pub mod lz4;
pub mod password;

pub use aead::{derive_key, ensure_salt, open, random_salt, seal, KEY_LEN, PBKDF2_ITERATIONS};
pub use atomic_writer::write_atomic;
pub use crc32::{crc32_bytes, crc32_file};
pub use password::{hash_password, verify_password};
