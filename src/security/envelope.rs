//! Envelope encryption for original inquiry text.
//!
//! Provides AES-256-GCM authenticated encryption so the unredacted original
//! of every inquiry can be stored durably without ever being readable from
//! the audit trail alone.
//!
//! # Security Properties
//!
//! - **Algorithm**: AES-256-GCM (authenticated encryption)
//! - **Key**: 32 bytes (256 bits) from a base64-encoded env var, held in a
//!   zeroizing container
//! - **Nonce**: 12 bytes, randomly generated per encryption, never reused for
//!   a given key
//! - **Tag**: 16 bytes, verified before any plaintext is returned
//!
//! # Usage
//!
//! ```bash
//! # Generate a key (32 random bytes, base64 encoded)
//! scrubgate keygen
//!
//! # Set the environment variable
//! export SCRUBGATE_ENCRYPTION_KEY="your-base64-encoded-key"
//! ```
//!
//! This module never logs plaintext, key bytes, or derived material.

use crate::{Error, Result};

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use base64::Engine;
use rand::Rng;
use secrecy::{ExposeSecret, SecretBox};

/// Nonce size for AES-256-GCM (12 bytes / 96 bits).
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size for AES-256-GCM (16 bytes / 128 bits).
pub const TAG_SIZE: usize = 16;

/// Key size for AES-256 (32 bytes / 256 bits).
const KEY_SIZE: usize = 32;

/// Environment variable for the encryption key.
pub const ENV_ENCRYPTION_KEY: &str = "SCRUBGATE_ENCRYPTION_KEY";

/// The 256-bit symmetric key, supplied once at process start.
///
/// The key bytes live in a [`SecretBox`] so they are zeroized on drop and
/// excluded from `Debug` output.
pub struct KeyMaterial {
    key: SecretBox<[u8; KEY_SIZE]>,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyMaterial([REDACTED])")
    }
}

impl KeyMaterial {
    /// Creates key material from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyConfiguration`] if the key is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(Error::KeyConfiguration(format!(
                "encryption key must be {KEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self {
            key: SecretBox::new(Box::new(key)),
        })
    }

    /// Creates key material from a base64-encoded key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyConfiguration`] if the key is invalid base64 or
    /// the wrong size.
    pub fn from_base64(key_b64: &str) -> Result<Self> {
        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(key_b64.trim())
            .map_err(|e| Error::KeyConfiguration(format!("invalid base64 encryption key: {e}")))?;

        Self::from_bytes(&key_bytes)
    }

    /// Loads key material from `SCRUBGATE_ENCRYPTION_KEY`.
    ///
    /// Absence or malformation is startup-fatal for the whole service: the
    /// caller must refuse to begin serving requests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyConfiguration`] if the variable is not set or
    /// invalid.
    pub fn from_env() -> Result<Self> {
        let key_b64 = std::env::var(ENV_ENCRYPTION_KEY).map_err(|_| {
            Error::KeyConfiguration(format!(
                "{ENV_ENCRYPTION_KEY} not set. Generate a key with: scrubgate keygen"
            ))
        })?;

        Self::from_base64(&key_b64)
    }
}

/// Self-contained encrypted unit: nonce + ciphertext + authentication tag.
///
/// Immutable once produced. Decrypting requires the same key that produced
/// it; a wrong key or tampered ciphertext/tag fails closed, never returning
/// garbage plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    /// Per-encryption random nonce.
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext without the trailing tag.
    pub ciphertext: Vec<u8>,
    /// GCM authentication tag.
    pub tag: [u8; TAG_SIZE],
}

/// AES-256-GCM cipher over inquiry text.
pub struct MessageCipher {
    cipher: Aes256Gcm,
}

impl MessageCipher {
    /// Creates a new cipher from key material.
    #[must_use]
    pub fn new(key: &KeyMaterial) -> Self {
        let key = Key::<Aes256Gcm>::from(*key.key.expose_secret());
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Creates a cipher from the environment key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyConfiguration`] if the key is missing or invalid.
    pub fn from_env() -> Result<Self> {
        let key = KeyMaterial::from_env()?;
        Ok(Self::new(&key))
    }

    /// Encrypts plaintext into a self-contained envelope.
    ///
    /// A fresh random nonce is generated per call; encrypting the same
    /// plaintext twice yields different envelopes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if encryption fails (only possible
    /// for plaintexts beyond the AES-GCM length bound, unreachable for
    /// inquiry text).
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedEnvelope> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);

        let mut combined = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| Error::OperationFailed {
                operation: "encrypt".to_string(),
                cause: format!("AES-256-GCM encryption failed: {e}"),
            })?;

        // aes-gcm appends the tag to the ciphertext; split it back out so the
        // envelope carries its parts explicitly.
        let tag_start = combined.len() - TAG_SIZE;
        let tag_bytes = combined.split_off(tag_start);
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&tag_bytes);

        tracing::debug!(
            plaintext_len = plaintext.len(),
            ciphertext_len = combined.len(),
            "sealed inquiry envelope"
        );

        Ok(EncryptedEnvelope {
            nonce: nonce_bytes,
            ciphertext: combined,
            tag,
        })
    }

    /// Decrypts an envelope, verifying the authentication tag first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] if the tag does not verify (wrong
    /// key or tampered envelope) or the plaintext is not valid UTF-8.
    pub fn decrypt(&self, envelope: &EncryptedEnvelope) -> Result<String> {
        let nonce = Nonce::from(envelope.nonce);

        let mut combined =
            Vec::with_capacity(envelope.ciphertext.len() + TAG_SIZE);
        combined.extend_from_slice(&envelope.ciphertext);
        combined.extend_from_slice(&envelope.tag);

        let plaintext = self
            .cipher
            .decrypt(&nonce, combined.as_slice())
            .map_err(|_| {
                Error::Authentication(
                    "envelope did not authenticate (wrong key or tampered data)".to_string(),
                )
            })?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::Authentication("decrypted bytes are not valid UTF-8".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> KeyMaterial {
        let bytes: Vec<u8> = (0u8..32).collect();
        KeyMaterial::from_bytes(&bytes).unwrap()
    }

    fn other_key() -> KeyMaterial {
        let bytes: Vec<u8> = (100u8..132).collect();
        KeyMaterial::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = MessageCipher::new(&test_key());
        let plaintext = "My SSN is 123-45-6789 and my email is test@example.com";

        let envelope = cipher.encrypt(plaintext).unwrap();
        assert_ne!(envelope.ciphertext, plaintext.as_bytes());

        let decrypted = cipher.decrypt(&envelope).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let cipher = MessageCipher::new(&test_key());

        let envelope = cipher.encrypt("").unwrap();
        assert_eq!(cipher.decrypt(&envelope).unwrap(), "");
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let cipher = MessageCipher::new(&test_key());
        let plaintext = "same plaintext";

        let first = cipher.encrypt(plaintext).unwrap();
        let second = cipher.encrypt(plaintext).unwrap();

        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.ciphertext, second.ciphertext);

        assert_eq!(cipher.decrypt(&first).unwrap(), plaintext);
        assert_eq!(cipher.decrypt(&second).unwrap(), plaintext);
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let cipher = MessageCipher::new(&test_key());
        let wrong = MessageCipher::new(&other_key());

        let envelope = cipher.encrypt("secret data").unwrap();
        let result = wrong.decrypt(&envelope);

        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[test]
    fn test_tampered_ciphertext_fails_closed() {
        let cipher = MessageCipher::new(&test_key());

        let mut envelope = cipher.encrypt("secret data").unwrap();
        let last = envelope.ciphertext.len() - 1;
        envelope.ciphertext[last] ^= 0xff;

        assert!(matches!(
            cipher.decrypt(&envelope),
            Err(Error::Authentication(_))
        ));
    }

    #[test]
    fn test_tampered_tag_fails_closed() {
        let cipher = MessageCipher::new(&test_key());

        let mut envelope = cipher.encrypt("secret data").unwrap();
        envelope.tag[0] ^= 0xff;

        assert!(matches!(
            cipher.decrypt(&envelope),
            Err(Error::Authentication(_))
        ));
    }

    #[test]
    fn test_key_length_validation() {
        assert!(matches!(
            KeyMaterial::from_bytes(&[0u8; 16]),
            Err(Error::KeyConfiguration(_))
        ));
        assert!(matches!(
            KeyMaterial::from_bytes(&[0u8; 33]),
            Err(Error::KeyConfiguration(_))
        ));
        assert!(KeyMaterial::from_bytes(&[0u8; 32]).is_ok());
    }

    #[test]
    fn test_key_from_base64() {
        // Valid 32-byte key in base64
        let key_b64 = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";
        assert!(KeyMaterial::from_base64(key_b64).is_ok());
    }

    #[test]
    fn test_key_from_base64_invalid() {
        // Too short
        assert!(matches!(
            KeyMaterial::from_base64("AAEC"),
            Err(Error::KeyConfiguration(_))
        ));

        // Invalid base64
        assert!(matches!(
            KeyMaterial::from_base64("not-valid-base64!!!"),
            Err(Error::KeyConfiguration(_))
        ));
    }

    #[test]
    fn test_debug_never_prints_key() {
        let key = test_key();
        let debug = format!("{key:?}");

        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("0, 1, 2"));
    }

    #[test]
    fn test_envelope_sizes() {
        let cipher = MessageCipher::new(&test_key());
        let envelope = cipher.encrypt("hello").unwrap();

        assert_eq!(envelope.nonce.len(), NONCE_SIZE);
        assert_eq!(envelope.tag.len(), TAG_SIZE);
        assert_eq!(envelope.ciphertext.len(), "hello".len());
    }
}
