//! Inquiry pipeline orchestration.
//!
//! Fixes the relative ordering of the gateway's stages: redaction and
//! encryption always run, the downstream call is conditional on the breaker,
//! and the audit append always runs, including for requests that never
//! reached the downstream call.

use crate::audit::{AuditRecord, AuditSink, InquiryOutcome};
use crate::downstream::AssistantClient;
use crate::resilience::{BreakerPhase, CircuitBreaker};
use crate::security::{MessageCipher, MessageRedactor};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// An inbound inquiry.
#[derive(Debug, Clone)]
pub struct InquiryRequest {
    /// The inquiring user.
    pub user_id: String,
    /// Free-text message; may contain PII.
    pub message: String,
    /// Request-scoped synthetic-failure signal for the downstream call.
    pub force_downstream_failure: bool,
}

/// The pipeline's structured response, returned on all paths except
/// validation failure.
#[derive(Debug, Clone, Serialize)]
pub struct InquiryResponse {
    /// The inquiring user.
    pub user_id: String,
    /// The message after PII redaction.
    pub redacted_message: String,
    /// Answer text: the assistant's reply, "Service Busy", or
    /// "AI Service Unavailable".
    pub answer: String,
    /// Breaker phase after the downstream decision was recorded.
    pub breaker_phase: BreakerPhase,
    /// Consecutive downstream failures at response time.
    pub fail_count: u32,
}

/// Orchestrates redaction, encryption, the breaker-gated downstream call,
/// and the audit append for each inquiry.
///
/// Owns the per-request transient data; the breaker is shared across all
/// concurrent executions, and the sink serializes their audit appends.
pub struct InquiryPipeline<C: AssistantClient> {
    redactor: MessageRedactor,
    cipher: MessageCipher,
    breaker: Arc<CircuitBreaker>,
    sink: AuditSink,
    client: C,
}

impl<C: AssistantClient> InquiryPipeline<C> {
    /// Creates a pipeline over its collaborators.
    #[must_use]
    pub const fn new(
        cipher: MessageCipher,
        breaker: Arc<CircuitBreaker>,
        sink: AuditSink,
        client: C,
    ) -> Self {
        Self {
            redactor: MessageRedactor::new(),
            cipher,
            breaker,
            sink,
            client,
        }
    }

    /// Processes one inquiry end to end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the user id or message is empty;
    /// nothing downstream of validation runs in that case: no redaction, no
    /// encryption, no audit record. Every other fault is absorbed into the
    /// response: downstream failures become an `ERROR` outcome, audit write
    /// faults are logged and counted. (Encryption itself can only fail
    /// beyond the AES-GCM length bound, unreachable for inquiry text.)
    pub async fn handle(&self, request: InquiryRequest) -> Result<InquiryResponse> {
        if request.user_id.trim().is_empty() {
            return Err(Error::InvalidInput(
                "userId must be a non-empty string".to_string(),
            ));
        }
        if request.message.trim().is_empty() {
            return Err(Error::InvalidInput(
                "message must be a non-empty string".to_string(),
            ));
        }

        let started = Instant::now();

        // Redact and encrypt the original unconditionally: the audit record
        // must carry both even when the downstream call is skipped.
        let (redacted, was_redacted) = self.redactor.redact_with_flag(&request.message);
        if was_redacted {
            metrics::counter!("inquiries_redacted_total").increment(1);
        }
        let envelope = self.cipher.encrypt(&request.message)?;

        let outcome = if self.breaker.can_execute() {
            match self
                .client
                .answer(&redacted, request.force_downstream_failure)
                .await
            {
                Ok(answer) => {
                    self.breaker.record_success();
                    InquiryOutcome::Answer(answer)
                },
                Err(e) => {
                    let tripped = self.breaker.record_failure();
                    if tripped {
                        metrics::counter!("downstream_circuit_breaker_trips_total").increment(1);
                        tracing::warn!(
                            provider = self.client.name(),
                            "circuit breaker opened after repeated downstream failures"
                        );
                    }
                    tracing::debug!(provider = self.client.name(), error = %e, "downstream call failed");
                    InquiryOutcome::Error
                },
            }
        } else {
            metrics::counter!("downstream_circuit_breaker_rejections_total").increment(1);
            InquiryOutcome::ServiceBusy
        };

        // Snapshot after the decision/record step so observers see the
        // breaker's current posture, not the pre-call one.
        let snapshot = self.breaker.state();

        let record = AuditRecord::new(
            request.user_id.clone(),
            envelope,
            redacted.clone(),
            outcome.clone(),
            snapshot.phase,
        );
        if let Err(e) = self.sink.append(record).await {
            // Audit write faults never abort the request.
            tracing::warn!(error = %e, "audit append failed for processed inquiry");
        }

        metrics::counter!("inquiries_total", "outcome" => outcome.as_str()).increment(1);
        metrics::histogram!("inquiry_duration_ms")
            .record(started.elapsed().as_secs_f64() * 1000.0);
        tracing::info!(
            user_id = %request.user_id,
            outcome = outcome.as_str(),
            breaker_phase = snapshot.phase.as_str(),
            "inquiry processed"
        );

        Ok(InquiryResponse {
            user_id: request.user_id,
            redacted_message: redacted,
            answer: outcome.answer_text().to_string(),
            breaker_phase: snapshot.phase,
            fail_count: snapshot.consecutive_failures,
        })
    }
}
