//! Encryption of stored gateway credentials
//!
//! Ciphertexts are `base64(nonce || ciphertext || tag)` under AES-256-GCM
//! with a fresh 96-bit nonce per value.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::RngCore;

use crate::error::{PaymentError, PaymentResult};

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;
const KEY_SIZE: usize = 32;

#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialCipher([REDACTED])")
    }
}

impl CredentialCipher {
    /// Build from a base64 encoded 32-byte key
    pub fn from_base64_key(encoded: &str) -> PaymentResult<Self> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| PaymentError::Crypto(format!("credential key is not base64: {}", e)))?;

        if key.len() != KEY_SIZE {
            return Err(PaymentError::Crypto(format!(
                "credential key must be {} bytes, got {}",
                KEY_SIZE,
                key.len()
            )));
        }

        Ok(Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> PaymentResult<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| PaymentError::Crypto(format!("encryption failed: {}", e)))?;

        let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(output))
    }

    pub fn decrypt(&self, encoded: &str) -> PaymentResult<String> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| PaymentError::Crypto(format!("ciphertext is not base64: {}", e)))?;

        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(PaymentError::Crypto("ciphertext too short".to_string()));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| PaymentError::Crypto("ciphertext failed authentication".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| PaymentError::Crypto("plaintext is not UTF-8".to_string()))
    }
}
