//! Integration tests for the inquiry pipeline.
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::doc_markdown
)]

use scrubgate::audit::{AuditSink, AuditStore};
use scrubgate::security::{KeyMaterial, MessageCipher, MessageRedactor};
use scrubgate::{
    AssistantClient, BreakerPhase, BreakerSettings, CircuitBreaker, Error, InquiryOutcome,
    InquiryPipeline, InquiryRequest, Result, SimulatedAssistant,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn test_key() -> KeyMaterial {
    let bytes: Vec<u8> = (0u8..32).collect();
    KeyMaterial::from_bytes(&bytes).unwrap()
}

fn fast_breaker() -> Arc<CircuitBreaker> {
    Arc::new(CircuitBreaker::new(BreakerSettings {
        failure_threshold: 3,
        cooldown: Duration::from_millis(100),
        half_open_max_calls: 1,
    }))
}

fn pipeline_with_latency(
    dir: &tempfile::TempDir,
    latency: Duration,
) -> InquiryPipeline<SimulatedAssistant> {
    let sink = AuditSink::spawn(AuditStore::new(dir.path().join("audit.json")));
    InquiryPipeline::new(
        MessageCipher::new(&test_key()),
        fast_breaker(),
        sink,
        SimulatedAssistant::new(latency),
    )
}

fn request(user_id: &str, message: &str, fail: bool) -> InquiryRequest {
    InquiryRequest {
        user_id: user_id.to_string(),
        message: message.to_string(),
        force_downstream_failure: fail,
    }
}

#[tokio::test]
async fn answer_path_returns_assistant_reply() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with_latency(&dir, Duration::from_millis(5));

    let response = pipeline
        .handle(request("u-1", "What is my balance?", false))
        .await
        .unwrap();

    assert_eq!(response.user_id, "u-1");
    assert_eq!(response.redacted_message, "What is my balance?");
    assert_eq!(
        response.answer,
        "Assistant response to: What is my balance?"
    );
    assert_eq!(response.breaker_phase, BreakerPhase::Closed);
    assert_eq!(response.fail_count, 0);
}

#[tokio::test]
async fn every_request_leaves_one_decryptable_audit_record() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with_latency(&dir, Duration::from_millis(1));
    let redactor = MessageRedactor::new();
    let cipher = MessageCipher::new(&test_key());

    let messages = [
        "Contact me at test@example.com immediately.",
        "My SSN is 123-45-6789 or 123456789.",
        "Charge my card 4242-4242-4242-4242 now.",
        "No PII in this one.",
    ];
    for (i, message) in messages.iter().enumerate() {
        pipeline
            .handle(request(&format!("user-{i}"), message, i % 2 == 1))
            .await
            .unwrap();
    }

    let records = AuditStore::new(dir.path().join("audit.json")).load();
    assert_eq!(records.len(), messages.len());

    // For every request: the record's redacted text equals redact(message)
    // and the envelope decrypts to exactly the original, independent of
    // downstream outcome.
    for (record, message) in records.iter().zip(messages.iter()) {
        assert_eq!(record.redacted_message, redactor.redact(message));
        assert_eq!(
            cipher.decrypt(&record.encrypted_original).unwrap(),
            *message
        );
    }
}

#[tokio::test]
async fn validation_failure_short_circuits_everything() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with_latency(&dir, Duration::from_millis(1));

    let err = pipeline
        .handle(request("", "hello", false))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert!(err.to_string().contains("userId"));

    let err = pipeline
        .handle(request("u-1", "   ", false))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert!(err.to_string().contains("message"));

    assert!(
        AuditStore::new(dir.path().join("audit.json"))
            .load()
            .is_empty()
    );
}

#[tokio::test]
async fn three_failures_open_the_breaker_and_busy_skips_latency() {
    let dir = tempfile::tempdir().unwrap();
    let latency = Duration::from_millis(200);
    let pipeline = pipeline_with_latency(&dir, latency);

    for _ in 0..3 {
        let response = pipeline.handle(request("u-1", "hello", true)).await.unwrap();
        assert_eq!(response.answer, "AI Service Unavailable");
    }

    // Breaker is open: the downstream call must be skipped entirely, so the
    // busy response cannot incur the simulated latency.
    let started = Instant::now();
    let response = pipeline.handle(request("u-1", "hello", false)).await.unwrap();
    assert!(started.elapsed() < latency);

    assert_eq!(response.answer, "Service Busy");
    assert_eq!(response.breaker_phase, BreakerPhase::Open);
    assert_eq!(response.fail_count, 3);
}

#[tokio::test]
async fn busy_and_error_outcomes_are_observably_different() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with_latency(&dir, Duration::from_millis(1));

    let error_response = pipeline.handle(request("u-1", "hi", true)).await.unwrap();
    for _ in 0..2 {
        pipeline.handle(request("u-1", "hi", true)).await.unwrap();
    }
    let busy_response = pipeline.handle(request("u-1", "hi", false)).await.unwrap();

    assert_eq!(error_response.answer, "AI Service Unavailable");
    assert_eq!(busy_response.answer, "Service Busy");
    assert_ne!(error_response.answer, busy_response.answer);
}

#[tokio::test]
async fn probe_recovers_after_cooldown() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with_latency(&dir, Duration::from_millis(1));

    for _ in 0..3 {
        pipeline.handle(request("u-1", "hello", true)).await.unwrap();
    }
    let busy = pipeline.handle(request("u-1", "hello", false)).await.unwrap();
    assert_eq!(busy.answer, "Service Busy");

    tokio::time::sleep(Duration::from_millis(150)).await;

    // First request after the cooldown is the probe; success closes the
    // circuit and resets the failure counter.
    let probe = pipeline.handle(request("u-1", "hello", false)).await.unwrap();
    assert_eq!(probe.answer, "Assistant response to: hello");
    assert_eq!(probe.breaker_phase, BreakerPhase::Closed);
    assert_eq!(probe.fail_count, 0);
}

#[tokio::test]
async fn failed_probe_reopens_with_fresh_window() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with_latency(&dir, Duration::from_millis(1));

    for _ in 0..3 {
        pipeline.handle(request("u-1", "hello", true)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(150)).await;

    let probe = pipeline.handle(request("u-1", "hello", true)).await.unwrap();
    assert_eq!(probe.answer, "AI Service Unavailable");
    assert_eq!(probe.breaker_phase, BreakerPhase::Open);

    // Immediately after the failed probe the circuit is open again.
    let busy = pipeline.handle(request("u-1", "hello", false)).await.unwrap();
    assert_eq!(busy.answer, "Service Busy");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_inquiries_are_all_audited_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Arc::new(pipeline_with_latency(&dir, Duration::from_millis(5)));

    let mut handles = Vec::new();
    for i in 0..24 {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            pipeline
                .handle(request(
                    &format!("user-{i}"),
                    &format!("message {i} from test@example.com"),
                    false,
                ))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let records = AuditStore::new(dir.path().join("audit.json")).load();
    assert_eq!(records.len(), 24);

    let ids: HashSet<_> = records.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids.len(), 24, "record ids must be unique");

    let users: HashSet<_> = records.iter().map(|r| r.user_id.clone()).collect();
    assert_eq!(users.len(), 24, "no request may be lost or duplicated");
}

#[tokio::test]
async fn breaker_state_is_shared_across_concurrent_executions() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Arc::new(pipeline_with_latency(&dir, Duration::from_millis(1)));

    // Three failures from different "users" trip the shared breaker.
    for i in 0..3 {
        pipeline
            .handle(request(&format!("user-{i}"), "hello", true))
            .await
            .unwrap();
    }

    let response = pipeline
        .handle(request("user-99", "hello", false))
        .await
        .unwrap();
    assert_eq!(response.answer, "Service Busy");
}

/// Assistant that fails with a timeout-shaped error, exercising the
/// documented policy that client-surfaced timeouts count as failures.
struct TimingOutAssistant;

impl AssistantClient for TimingOutAssistant {
    fn name(&self) -> &'static str {
        "timing-out"
    }

    fn answer(
        &self,
        _message: &str,
        _force_failure: bool,
    ) -> impl std::future::Future<Output = Result<String>> + Send {
        async {
            Err(Error::Downstream {
                cause: "deadline elapsed".to_string(),
            })
        }
    }
}

#[tokio::test]
async fn client_surfaced_timeouts_count_as_breaker_failures() {
    let dir = tempfile::tempdir().unwrap();
    let sink = AuditSink::spawn(AuditStore::new(dir.path().join("audit.json")));
    let pipeline = InquiryPipeline::new(
        MessageCipher::new(&test_key()),
        fast_breaker(),
        sink,
        TimingOutAssistant,
    );

    for _ in 0..3 {
        let response = pipeline.handle(request("u-1", "hello", false)).await.unwrap();
        assert_eq!(response.answer, "AI Service Unavailable");
    }
    assert_eq!(
        pipeline
            .handle(request("u-1", "hello", false))
            .await
            .unwrap()
            .answer,
        "Service Busy"
    );

    let records = AuditStore::new(dir.path().join("audit.json")).load();
    assert_eq!(records.len(), 4);
    assert_eq!(records[2].outcome, InquiryOutcome::Error);
    assert_eq!(records[3].outcome, InquiryOutcome::ServiceBusy);
}

#[tokio::test]
async fn audit_records_carry_post_transition_breaker_phase() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with_latency(&dir, Duration::from_millis(1));

    for _ in 0..3 {
        pipeline.handle(request("u-1", "hello", true)).await.unwrap();
    }

    let records = AuditStore::new(dir.path().join("audit.json")).load();

    // First two failures: breaker still closed at write time. The third
    // tripped it, and its own record already shows OPEN.
    assert_eq!(records[0].breaker_phase_at_write, BreakerPhase::Closed);
    assert_eq!(records[1].breaker_phase_at_write, BreakerPhase::Closed);
    assert_eq!(records[2].breaker_phase_at_write, BreakerPhase::Open);
}

#[tokio::test]
async fn corrupt_audit_store_keeps_the_pipeline_live() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.json");
    std::fs::write(&path, "definitely not json").unwrap();

    let pipeline = pipeline_with_latency(&dir, Duration::from_millis(1));
    let response = pipeline.handle(request("u-1", "hello", false)).await.unwrap();
    assert_eq!(response.answer, "Assistant response to: hello");

    // The damaged store was recovered as empty and the new record persisted.
    let records = AuditStore::new(&path).load();
    assert_eq!(records.len(), 1);
}
