//! Audit record model.
//!
//! # HMAC Chain Integrity
//!
//! When the store is configured with an HMAC key, records are
//! cryptographically chained using HMAC-SHA256: each record includes the HMAC
//! of the previous record, creating an append-only chain that detects
//! tampering or deletion. The chain starts from [`GENESIS_HMAC`].

use crate::resilience::BreakerPhase;
use crate::security::EncryptedEnvelope;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

/// HMAC-SHA256 type alias.
type HmacSha256 = Hmac<Sha256>;

/// Genesis hash for the first record in an HMAC chain.
pub const GENESIS_HMAC: &str = "genesis";

/// Outcome of a processed inquiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "answer", rename_all = "snake_case")]
pub enum InquiryOutcome {
    /// The downstream assistant answered.
    Answer(String),
    /// The breaker was open; the downstream call was skipped.
    ServiceBusy,
    /// The downstream call executed and failed.
    Error,
}

impl InquiryOutcome {
    /// Stable label for metrics and the HMAC canonical string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Answer(_) => "answer",
            Self::ServiceBusy => "service_busy",
            Self::Error => "error",
        }
    }

    /// The answer text shown to the caller.
    ///
    /// The breaker-open case and the downstream-failure case are observably
    /// different payloads even though both are non-answer outcomes.
    #[must_use]
    pub fn answer_text(&self) -> &str {
        match self {
            Self::Answer(text) => text,
            Self::ServiceBusy => "Service Busy",
            Self::Error => "AI Service Unavailable",
        }
    }

    /// HTTP status for this outcome at a transport boundary.
    ///
    /// Preserves the original service's asymmetry: a downstream failure maps
    /// to 503 while the circuit-open fallback is a success-shaped 200. The
    /// core pipeline does not use this; it exists for embedding transports.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Answer(_) | Self::ServiceBusy => 200,
            Self::Error => 503,
        }
    }
}

/// One persisted, immutable entry per processed inquiry.
///
/// Created after the downstream decision is known and persisted exactly once
/// per request, including requests that never reach the downstream call.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    /// Unique record ID.
    pub id: String,
    /// The inquiring user.
    pub user_id: String,
    /// Timestamp of the append.
    pub created_at: DateTime<Utc>,
    /// The original message, sealed under the process key.
    pub encrypted_original: EncryptedEnvelope,
    /// The redacted message that was shown downstream.
    pub redacted_message: String,
    /// What happened to the inquiry.
    pub outcome: InquiryOutcome,
    /// Breaker phase observed after the downstream decision was recorded.
    pub breaker_phase_at_write: BreakerPhase,
    /// HMAC signature of this record (hex-encoded).
    ///
    /// Computed as: `HMAC-SHA256(key, id || timestamp || user_id || outcome
    /// || tag_hex || previous_hmac)`
    pub hmac_signature: Option<String>,
    /// HMAC of the previous record in the chain (hex-encoded).
    pub previous_hmac: Option<String>,
}

impl AuditRecord {
    /// Creates a new unsigned record for the current time.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        encrypted_original: EncryptedEnvelope,
        redacted_message: impl Into<String>,
        outcome: InquiryOutcome,
        breaker_phase_at_write: BreakerPhase,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            created_at: Utc::now(),
            encrypted_original,
            redacted_message: redacted_message.into(),
            outcome,
            breaker_phase_at_write,
            hmac_signature: None,
            previous_hmac: None,
        }
    }

    /// Computes the canonical string for HMAC signing.
    ///
    /// The envelope tag ties the signature to the sealed original, so a
    /// swapped envelope breaks the chain even though ciphertext itself is
    /// not re-signed.
    #[must_use]
    pub fn canonical_string(&self, previous_hmac: &str) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.id,
            self.created_at.to_rfc3339(),
            self.user_id,
            self.outcome.as_str(),
            hex::encode(self.encrypted_original.tag),
            previous_hmac
        )
    }

    /// Computes the HMAC signature for this record.
    ///
    /// Returns `None` if the HMAC key is invalid (HMAC-SHA256 accepts any
    /// key length, so this does not happen in practice).
    #[must_use]
    pub fn compute_hmac(&self, key: &[u8], previous_hmac: &str) -> Option<String> {
        let canonical = self.canonical_string(previous_hmac);
        let mut mac = HmacSha256::new_from_slice(key).ok()?;
        mac.update(canonical.as_bytes());
        let result = mac.finalize();
        Some(hex::encode(result.into_bytes()))
    }

    /// Signs this record, setting both the signature and the previous hash.
    ///
    /// Returns `false` if the HMAC key is invalid.
    pub fn sign(&mut self, key: &[u8], previous_hmac: &str) -> bool {
        if let Some(sig) = self.compute_hmac(key, previous_hmac) {
            self.previous_hmac = Some(previous_hmac.to_string());
            self.hmac_signature = Some(sig);
            true
        } else {
            false
        }
    }

    /// Verifies this record's HMAC signature.
    #[must_use]
    pub fn verify(&self, key: &[u8]) -> bool {
        let Some(ref signature) = self.hmac_signature else {
            return false;
        };
        let Some(ref previous) = self.previous_hmac else {
            return false;
        };

        self.compute_hmac(key, previous)
            .is_some_and(|computed| computed == *signature)
    }
}
