//! Durable audit store.
//!
//! Persists the audit trail as one JSON document holding the full ordered
//! record sequence. The whole collection is the unit of read-modify-write on
//! every append; serialization of concurrent appends is the sink's job, not
//! this type's.
//!
//! # Corruption policy
//!
//! A store that fails to read (missing, oversize, unparseable, or with
//! undecodable envelope fields) is treated as empty and appends proceed.
//! Availability is deliberately favored over completeness here; the fault is
//! reported through logging and metrics, never swallowed silently.

use super::record::{AuditRecord, GENESIS_HMAC, InquiryOutcome};
use crate::resilience::BreakerPhase;
use crate::security::{EncryptedEnvelope, NONCE_SIZE, TAG_SIZE};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Maximum store document size (64 MB).
/// Prevents memory exhaustion from a damaged or maliciously large file.
const MAX_STORE_SIZE: u64 = 64 * 1024 * 1024;

/// Serializable envelope format for the store document.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEnvelope {
    nonce: String,
    ciphertext: String,
    tag: String,
}

impl From<&EncryptedEnvelope> for StoredEnvelope {
    fn from(envelope: &EncryptedEnvelope) -> Self {
        Self {
            nonce: hex::encode(envelope.nonce),
            ciphertext: hex::encode(&envelope.ciphertext),
            tag: hex::encode(envelope.tag),
        }
    }
}

impl StoredEnvelope {
    fn decode(&self) -> Option<EncryptedEnvelope> {
        let nonce: [u8; NONCE_SIZE] = hex::decode(&self.nonce).ok()?.try_into().ok()?;
        let tag: [u8; TAG_SIZE] = hex::decode(&self.tag).ok()?.try_into().ok()?;
        let ciphertext = hex::decode(&self.ciphertext).ok()?;
        Some(EncryptedEnvelope {
            nonce,
            ciphertext,
            tag,
        })
    }
}

/// Serializable record format for the store document.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    id: String,
    user_id: String,
    created_at: DateTime<Utc>,
    encrypted_original: StoredEnvelope,
    redacted_message: String,
    outcome: InquiryOutcome,
    breaker_phase_at_write: BreakerPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hmac_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    previous_hmac: Option<String>,
}

impl From<&AuditRecord> for StoredRecord {
    fn from(record: &AuditRecord) -> Self {
        Self {
            id: record.id.clone(),
            user_id: record.user_id.clone(),
            created_at: record.created_at,
            encrypted_original: StoredEnvelope::from(&record.encrypted_original),
            redacted_message: record.redacted_message.clone(),
            outcome: record.outcome.clone(),
            breaker_phase_at_write: record.breaker_phase_at_write,
            hmac_signature: record.hmac_signature.clone(),
            previous_hmac: record.previous_hmac.clone(),
        }
    }
}

impl StoredRecord {
    fn decode(self) -> Option<AuditRecord> {
        let encrypted_original = self.encrypted_original.decode()?;
        Some(AuditRecord {
            id: self.id,
            user_id: self.user_id,
            created_at: self.created_at,
            encrypted_original,
            redacted_message: self.redacted_message,
            outcome: self.outcome,
            breaker_phase_at_write: self.breaker_phase_at_write,
            hmac_signature: self.hmac_signature,
            previous_hmac: self.previous_hmac,
        })
    }
}

/// The persisted document: a version marker plus the ordered record sequence.
#[derive(Debug, Serialize, Deserialize, Default)]
struct StoredDocument {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    records: Vec<StoredRecord>,
}

const fn default_version() -> u32 {
    1
}

/// Append-only audit store over a single JSON document.
pub struct AuditStore {
    path: PathBuf,
    /// HMAC key for chain signing. `None` leaves records unsigned.
    hmac_key: Option<Vec<u8>>,
}

impl AuditStore {
    /// Creates a store over the given document path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            hmac_key: None,
        }
    }

    /// Enables HMAC chain signing with the given key.
    #[must_use]
    pub fn with_hmac_key(mut self, key: Vec<u8>) -> Self {
        self.hmac_key = Some(key);
        self
    }

    /// Returns the store document path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns whether HMAC signing is enabled.
    #[must_use]
    pub const fn is_signing_enabled(&self) -> bool {
        self.hmac_key.is_some()
    }

    /// Loads the full record sequence.
    ///
    /// Corruption-tolerant: a missing file yields an empty sequence; an
    /// unreadable, oversize, or unparseable document is reported and treated
    /// as empty so the pipeline stays live.
    #[must_use]
    pub fn load(&self) -> Vec<AuditRecord> {
        if !self.path.exists() {
            return Vec::new();
        }

        let size = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        if size > MAX_STORE_SIZE {
            self.recover("document exceeds size limit");
            return Vec::new();
        }

        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                self.recover(&format!("read failed: {e}"));
                return Vec::new();
            },
        };

        let document: StoredDocument = match serde_json::from_str(&raw) {
            Ok(document) => document,
            Err(e) => {
                self.recover(&format!("parse failed: {e}"));
                return Vec::new();
            },
        };

        let total = document.records.len();
        let records: Vec<AuditRecord> = document
            .records
            .into_iter()
            .filter_map(StoredRecord::decode)
            .collect();
        if records.len() < total {
            self.recover("one or more records had undecodable envelope fields");
            return Vec::new();
        }

        records
    }

    /// Appends one record: read existing sequence, push, persist the whole
    /// collection.
    ///
    /// When signing is enabled the record is chained to the last persisted
    /// signature (or [`GENESIS_HMAC`] for an empty store) before the write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] only on an unrecoverable storage
    /// fault during the write; read-side corruption is absorbed by [`Self::load`].
    pub fn append(&self, record: AuditRecord) -> Result<()> {
        let mut records = self.load();
        let mut record = record;

        if let Some(ref key) = self.hmac_key {
            let previous = records
                .last()
                .and_then(|last| last.hmac_signature.clone())
                .unwrap_or_else(|| GENESIS_HMAC.to_string());
            record.sign(key, &previous);
        }

        records.push(record);
        self.persist(&records)
    }

    /// Verifies the HMAC chain integrity of all persisted records.
    ///
    /// # Errors
    ///
    /// Returns an error if no HMAC key is configured, a record is missing or
    /// fails its signature, or the chain linkage is broken.
    pub fn verify_chain(&self) -> Result<()> {
        let key = self.hmac_key.as_ref().ok_or_else(|| Error::OperationFailed {
            operation: "verify_chain".to_string(),
            cause: "no HMAC key configured".to_string(),
        })?;

        let records = self.load();
        let mut expected_previous = GENESIS_HMAC.to_string();

        for (i, record) in records.iter().enumerate() {
            let Some(ref signature) = record.hmac_signature else {
                return Err(Error::OperationFailed {
                    operation: "verify_chain".to_string(),
                    cause: format!("record {i} missing hmac_signature"),
                });
            };
            let Some(ref previous) = record.previous_hmac else {
                return Err(Error::OperationFailed {
                    operation: "verify_chain".to_string(),
                    cause: format!("record {i} missing previous_hmac"),
                });
            };

            if *previous != expected_previous {
                return Err(Error::OperationFailed {
                    operation: "verify_chain".to_string(),
                    cause: format!(
                        "record {i} chain broken: expected previous '{expected_previous}', got '{previous}'"
                    ),
                });
            }

            if !record.verify(key) {
                return Err(Error::OperationFailed {
                    operation: "verify_chain".to_string(),
                    cause: format!("record {i} has invalid signature"),
                });
            }

            expected_previous.clone_from(signature);
        }

        Ok(())
    }

    /// Reports a corruption recovery: the fault is logged and counted, and
    /// the caller proceeds with an empty collection.
    fn recover(&self, cause: &str) {
        tracing::warn!(
            path = %self.path.display(),
            cause,
            "audit store unreadable, recovering with empty collection"
        );
        metrics::counter!("audit_store_recoveries_total").increment(1);
    }

    /// Persists the full record sequence: write to a temp file in the store
    /// directory, then rename over the document.
    ///
    /// # Security
    ///
    /// On Unix the document is created with mode 0o600 (owner read/write
    /// only); the trail holds ciphertext but also user ids and redacted text.
    fn persist(&self, records: &[AuditRecord]) -> Result<()> {
        let document = StoredDocument {
            version: default_version(),
            records: records.iter().map(StoredRecord::from).collect(),
        };

        let json = serde_json::to_string(&document).map_err(|e| Error::OperationFailed {
            operation: "audit_persist".to_string(),
            cause: format!("serialize failed: {e}"),
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                    operation: "audit_persist".to_string(),
                    cause: format!("create dir failed: {e}"),
                })?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        write_owner_only(&tmp_path, json.as_bytes()).map_err(|e| Error::OperationFailed {
            operation: "audit_persist".to_string(),
            cause: format!("write failed: {e}"),
        })?;

        fs::rename(&tmp_path, &self.path).map_err(|e| Error::OperationFailed {
            operation: "audit_persist".to_string(),
            cause: format!("rename failed: {e}"),
        })
    }
}

/// Writes a file readable and writable by the owner only.
#[cfg(unix)]
fn write_owner_only(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_owner_only(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    fs::write(path, contents)
}
