//! Security features.
//!
//! PII detection and redaction, plus envelope encryption for original
//! inquiry text.

mod envelope;
mod pii;
mod redactor;

pub use envelope::{
    ENV_ENCRYPTION_KEY, EncryptedEnvelope, KeyMaterial, MessageCipher, NONCE_SIZE, TAG_SIZE,
};
pub use pii::{PiiCategory, PiiDetector, PiiMatch};
pub use redactor::MessageRedactor;
