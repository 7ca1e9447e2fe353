//! Downstream assistant client.
//!
//! The assistant is an external collaborator: only its success/failure and
//! latency contract matters to the gateway. Implementations receive already
//! redacted text; the original never crosses this boundary.

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// Client for the downstream assistant call.
///
/// There is no mid-flight cancellation in this contract. An implementation
/// that times out internally must surface the timeout as an `Err`, which the
/// pipeline records as a failure for breaker purposes; a task cancellation
/// that unwinds the pipeline records nothing.
pub trait AssistantClient: Send + Sync {
    /// Provider name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Answers a redacted inquiry.
    ///
    /// `force_failure` is a request-scoped synthetic-failure signal used for
    /// resilience testing; it must produce the same `Err` path a real
    /// downstream fault would.
    fn answer(
        &self,
        message: &str,
        force_failure: bool,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Simulated assistant with fixed latency.
///
/// Stands in for the real downstream service: sleeps the configured latency,
/// then echoes an acknowledgement or fails when asked to.
#[derive(Debug, Clone)]
pub struct SimulatedAssistant {
    latency: Duration,
}

impl SimulatedAssistant {
    /// Creates a simulated assistant with the given response latency.
    #[must_use]
    pub const fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl AssistantClient for SimulatedAssistant {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn answer(
        &self,
        message: &str,
        force_failure: bool,
    ) -> impl Future<Output = Result<String>> + Send {
        let latency = self.latency;
        let message = message.to_string();
        async move {
            tokio::time::sleep(latency).await;

            if force_failure {
                return Err(Error::Downstream {
                    cause: "synthetic failure requested".to_string(),
                });
            }

            Ok(format!("Assistant response to: {message}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_simulated_answer() {
        let client = SimulatedAssistant::new(Duration::from_millis(10));
        let answer = tokio_test::assert_ok!(client.answer("hello", false).await);

        assert_eq!(answer, "Assistant response to: hello");
    }

    #[tokio::test]
    async fn test_forced_failure() {
        let client = SimulatedAssistant::new(Duration::from_millis(1));
        let result = client.answer("hello", true).await;

        assert!(matches!(result, Err(Error::Downstream { .. })));
    }

    #[tokio::test]
    async fn test_latency_is_honored() {
        let client = SimulatedAssistant::new(Duration::from_millis(40));
        let started = Instant::now();
        client.answer("hello", false).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
