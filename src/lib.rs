//! # Scrubgate
//!
//! Privacy gateway for AI assistant inquiries.
//!
//! Scrubgate sits between users and an expensive, unreliable AI assistant.
//! Every inquiry is scrubbed of personally identifiable information before it
//! leaves the process, the original text is sealed in an authenticated
//! encryption envelope for durable storage, and each request is recorded in an
//! append-only audit trail. The downstream call itself is gated behind a
//! failure-aware circuit breaker so a broken assistant fails fast instead of
//! piling up latency.
//!
//! ## Pipeline
//!
//! Redaction and encryption run unconditionally; the downstream call is
//! conditional on the breaker; the audit append runs unconditionally:
//!
//! ```text
//! inquiry -> redact -> encrypt original -> breaker decision
//!         -> { skip | downstream call -> record result }
//!         -> audit append -> response
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use scrubgate::{InquiryPipeline, InquiryRequest, SimulatedAssistant};
//!
//! let response = pipeline
//!     .handle(InquiryRequest {
//!         user_id: "u-1".to_string(),
//!         message: "Contact me at test@example.com".to_string(),
//!         force_downstream_failure: false,
//!     })
//!     .await?;
//! assert_eq!(response.redacted_message, "Contact me at <REDACTED: EMAIL>");
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod audit;
pub mod config;
pub mod downstream;
pub mod observability;
pub mod pipeline;
pub mod resilience;
pub mod security;

// Re-exports for convenience
pub use audit::{AuditRecord, AuditSink, AuditStore, InquiryOutcome};
pub use config::ScrubgateConfig;
pub use downstream::{AssistantClient, SimulatedAssistant};
pub use pipeline::{InquiryPipeline, InquiryRequest, InquiryResponse};
pub use resilience::{BreakerPhase, BreakerSettings, BreakerSnapshot, CircuitBreaker};
pub use security::{
    EncryptedEnvelope, KeyMaterial, MessageCipher, MessageRedactor, PiiCategory, PiiDetector,
};

/// Error type for scrubgate operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Empty user id or message, malformed CLI arguments |
/// | `KeyConfiguration` | Encryption key absent, not base64, or not 32 bytes |
/// | `Authentication` | Envelope decryption fails (wrong key or tampering) |
/// | `Downstream` | The downstream assistant call fails |
/// | `OperationFailed` | Audit store I/O faults, observability init failures |
///
/// # Propagation Policy
///
/// Only `InvalidInput` terminates a request and only `KeyConfiguration`
/// terminates startup. `Downstream` is recorded into the breaker and converted
/// into a response payload, never surfaced to the pipeline caller.
/// `OperationFailed` from the audit store is absorbed by the pipeline's
/// empty-collection fallback and logged. `Authentication` is only relevant to
/// maintenance tooling (`scrubgate audit verify`).
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - The inquiry user id is empty or whitespace
    /// - The inquiry message is empty or whitespace
    /// - A CLI argument fails validation before the pipeline runs
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The encryption key is missing or malformed.
    ///
    /// Raised when:
    /// - `SCRUBGATE_ENCRYPTION_KEY` is not set at startup
    /// - The key is not valid base64
    /// - The decoded key is not exactly 32 bytes
    ///
    /// This is startup-fatal: the process refuses to serve requests.
    #[error("key configuration: {0}")]
    KeyConfiguration(String),

    /// Envelope authentication failed on decrypt.
    ///
    /// Raised when:
    /// - The authentication tag does not verify (wrong key or tampered data)
    /// - The decrypted bytes are not valid UTF-8
    ///
    /// Never surfaced to end users; decryption only happens in maintenance
    /// tooling, never on the request path.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The downstream assistant call failed.
    ///
    /// Raised when:
    /// - The assistant returns an error
    /// - A request carries the synthetic forced-failure flag
    ///
    /// Always absorbed into an `ERROR` outcome and a breaker failure record;
    /// the pipeline caller receives a structured response instead.
    #[error("downstream call failed: {cause}")]
    Downstream {
        /// The underlying cause.
        cause: String,
    },

    /// An operation failed.
    ///
    /// Raised when:
    /// - Audit store reads or writes hit an unrecoverable I/O fault
    /// - The audit worker has shut down while appends are pending
    /// - Observability initialization fails
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for scrubgate operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::KeyConfiguration("key must be 32 bytes".to_string());
        assert_eq!(err.to_string(), "key configuration: key must be 32 bytes");

        let err = Error::Downstream {
            cause: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "downstream call failed: connection refused"
        );

        let err = Error::OperationFailed {
            operation: "audit_append".to_string(),
            cause: "disk full".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "operation 'audit_append' failed: disk full"
        );
    }
}
