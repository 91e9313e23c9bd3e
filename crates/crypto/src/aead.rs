//! Authenticated encryption and password-based key derivation.
//!
//! Key derivation is PBKDF2-HMAC-SHA256 with 200,000 iterations over a
//! password and a random 32-byte salt, producing a 32-byte key for
//! AES-256-GCM. Every sealed record is framed as `nonce[12] ||
//! ciphertext || tag[16]`, with the tag appended to the ciphertext by
//! the AEAD implementation itself.

use aes_gcm::aead::{Aead as _, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use amftpd_core::{Error, Result};
use hmac::Hmac;
use sha2::Sha256;
use std::path::Path;

/// PBKDF2-HMAC-SHA256 iteration count (§4.2).
pub const PBKDF2_ITERATIONS: u32 = 200_000;

/// Length in bytes of the derived key and of the on-disk salt.
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Derive a 32-byte AES-256-GCM key from a UTF-8 password and a 32-byte
/// salt.
pub fn derive_key(password: &str, salt: &[u8; KEY_LEN]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key)
        .expect("PBKDF2 output length is fixed and always valid");
    key
}

/// Load the 32-byte salt at `path`, or generate and persist a fresh one.
///
/// A missing salt file is only an error when paired with a non-empty
/// sibling snapshot (the caller, `Store::open`, enforces that rule);
/// this function's own contract is simply "return a usable salt".
pub fn ensure_salt(path: &Path) -> Result<[u8; KEY_LEN]> {
    if let Ok(bytes) = std::fs::read(path) {
        if bytes.len() == KEY_LEN {
            let mut salt = [0u8; KEY_LEN];
            salt.copy_from_slice(&bytes);
            return Ok(salt);
        }
        return Err(Error::CryptoFailed(format!(
            "salt file {path:?} has unexpected length {}",
            bytes.len()
        )));
    }
    let salt = random_salt();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, salt)?;
    Ok(salt)
}

/// Generate a fresh random salt without persisting it anywhere — used
/// by backup creation, where each backup gets its own salt independent
/// of the live store's on-disk salt.
pub fn random_salt() -> [u8; KEY_LEN] {
    use rand::RngCore;
    let mut salt = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Seal `plaintext` under `key`, with `aad` bound into the tag but not
/// stored. Returns `nonce || ciphertext || tag`.
pub fn seal(key: &[u8; KEY_LEN], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let payload = aes_gcm::aead::Payload { msg: plaintext, aad };
    let sealed = cipher
        .encrypt(&nonce, payload)
        .map_err(|e| Error::CryptoFailed(e.to_string()))?;
    let mut framed = Vec::with_capacity(NONCE_LEN + sealed.len());
    framed.extend_from_slice(nonce.as_slice());
    framed.extend_from_slice(&sealed);
    Ok(framed)
}

/// Open a frame produced by [`seal`].
pub fn open(key: &[u8; KEY_LEN], aad: &[u8], framed: &[u8]) -> Result<Vec<u8>> {
    if framed.len() < NONCE_LEN + TAG_LEN {
        return Err(Error::CryptoFailed("AEAD frame shorter than nonce+tag".into()));
    }
    let (nonce_bytes, rest) = framed.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);
    let payload = aes_gcm::aead::Payload { msg: rest, aad };
    cipher
        .decrypt(nonce, payload)
        .map_err(|e| Error::CryptoFailed(e.to_string()))
}
