//! Opaque secrets handed to clients once and stored only as a digest

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Bytes of entropy in every opaque secret
const SECRET_BYTES: usize = 32;

/// Generate a random secret, hex encoded
pub fn new_opaque_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 digest of a raw secret, hex encoded
pub fn hash_opaque_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_64_hex_chars_and_unique() {
        let a = new_opaque_secret();
        let b = new_opaque_secret();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_stable_sha256() {
        assert_eq!(
            hash_opaque_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(hash_opaque_token("abc"), "abc");
    }
}
