//! Bootstrap account password hashing.
//!
//! Full authentication is outside this crate's scope; this exists only
//! so `DatabaseManager`'s bootstrap admin account has a `password_hash`
//! value that isn't the plaintext password. Reuses the same PBKDF2
//! derivation as store encryption, with its own random salt embedded in
//! the output so the hash is self-describing.

use crate::aead::{derive_key, random_salt, KEY_LEN, PBKDF2_ITERATIONS};

const PREFIX: &str = "pbkdf2-sha256";

/// Hash `password`, embedding algorithm, iteration count, and salt in
/// the output so it round-trips without external state.
pub fn hash_password(password: &str) -> String {
    let salt = random_salt();
    let key = derive_key(password, &salt);
    format!("{PREFIX}${PBKDF2_ITERATIONS}${}${}", to_hex(&salt), to_hex(&key))
}

/// Check whether `password` matches a hash produced by [`hash_password`].
pub fn verify_password(password: &str, hash: &str) -> bool {
    let mut parts = hash.split('$');
    let (Some(PREFIX), Some(_iterations), Some(salt_hex), Some(expected_hex)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let Some(salt_bytes) = from_hex(salt_hex) else { return false };
    if salt_bytes.len() != KEY_LEN {
        return false;
    }
    let mut salt = [0u8; KEY_LEN];
    salt.copy_from_slice(&salt_bytes);
    to_hex(&derive_key(password, &salt)) == expected_hex
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn from_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let hash = hash_password("admin");
        assert!(verify_password("admin", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn two_hashes_of_the_same_password_differ() {
        assert_ne!(hash_password("admin"), hash_password("admin"));
    }
}
