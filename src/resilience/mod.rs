//! Downstream call resilience.
//!
//! Circuit breaker guarding the downstream assistant call. One instance per
//! process, shared by every concurrent pipeline execution; all three
//! operations take the internal mutex so concurrent transitions can never
//! corrupt the failure count or lose a transition.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Breaker phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerPhase {
    /// Normal operation; downstream calls flow through.
    Closed,
    /// Failing fast; downstream calls are skipped until the cooldown elapses.
    Open,
    /// Recovery probe window after the cooldown.
    HalfOpen,
}

impl BreakerPhase {
    /// String form used in responses and audit records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }

    /// Numeric value for the state gauge.
    const fn metric_value(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// How long to keep the circuit open before allowing a probe.
    pub cooldown: Duration,
    /// Maximum probe calls while half-open.
    pub half_open_max_calls: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
            half_open_max_calls: 1,
        }
    }
}

/// Point-in-time view of the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    /// Current phase.
    pub phase: BreakerPhase,
    /// Consecutive recorded failures.
    pub consecutive_failures: u32,
}

#[derive(Debug)]
struct BreakerInner {
    phase: BreakerPhase,
    consecutive_failures: u32,
    /// Set exactly while `phase` is `Open`.
    reopen_at: Option<Instant>,
    half_open_calls: u32,
}

/// Circuit breaker state machine.
///
/// Transitions:
/// - CLOSED -> OPEN when the failure count reaches the threshold
/// - OPEN -> HALF_OPEN lazily inside [`Self::can_execute`] once the cooldown
///   elapses; that call claims the probe and returns `true`
/// - HALF_OPEN -> CLOSED on a recorded success
/// - HALF_OPEN -> OPEN on a recorded failure, with a fresh cooldown window
///
/// [`Self::state`] is a pure read and never triggers a transition.
pub struct CircuitBreaker {
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a new breaker in the closed phase.
    #[must_use]
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(BreakerInner {
                phase: BreakerPhase::Closed,
                consecutive_failures: 0,
                reopen_at: None,
                half_open_calls: 0,
            }),
        }
    }

    /// Creates a breaker with the default settings (threshold 3, 30 s
    /// cooldown, single probe).
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BreakerSettings::default())
    }

    /// Returns whether a downstream call may execute right now.
    ///
    /// CLOSED always allows. OPEN refuses until the cooldown elapses, at
    /// which point the breaker flips to HALF_OPEN and this call becomes the
    /// probe. HALF_OPEN allows up to `half_open_max_calls` probes; further
    /// callers are refused until the probe records a result.
    pub fn can_execute(&self) -> bool {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match inner.phase {
            BreakerPhase::Closed => true,
            BreakerPhase::Open => {
                let elapsed = inner.reopen_at.is_none_or(|at| Instant::now() >= at);
                if elapsed {
                    inner.phase = BreakerPhase::HalfOpen;
                    inner.reopen_at = None;
                    inner.half_open_calls = 1;
                    Self::publish_state(inner.phase);
                    tracing::info!("circuit breaker half-open, allowing probe");
                    true
                } else {
                    false
                }
            },
            BreakerPhase::HalfOpen => {
                if inner.half_open_calls >= self.settings.half_open_max_calls {
                    false
                } else {
                    inner.half_open_calls += 1;
                    true
                }
            },
        }
    }

    /// Records a successful downstream attempt.
    ///
    /// Must be called exactly once per executed attempt, never for skipped
    /// ones. Closes the circuit and resets the failure count from any phase.
    pub fn record_success(&self) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        inner.phase = BreakerPhase::Closed;
        inner.consecutive_failures = 0;
        inner.reopen_at = None;
        inner.half_open_calls = 0;
        Self::publish_state(inner.phase);
    }

    /// Records a failed downstream attempt.
    ///
    /// Returns `true` if this failure tripped the circuit open.
    pub fn record_failure(&self) -> bool {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let tripped = match inner.phase {
            BreakerPhase::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.settings.failure_threshold {
                    inner.phase = BreakerPhase::Open;
                    inner.reopen_at = Some(Instant::now() + self.settings.cooldown);
                    true
                } else {
                    false
                }
            },
            BreakerPhase::HalfOpen => {
                // Failed probe: reopen with a fresh cooldown window.
                inner.consecutive_failures += 1;
                inner.phase = BreakerPhase::Open;
                inner.reopen_at = Some(Instant::now() + self.settings.cooldown);
                inner.half_open_calls = 0;
                true
            },
            // Failures are never recorded for skipped attempts.
            BreakerPhase::Open => false,
        };

        Self::publish_state(inner.phase);
        tripped
    }

    /// Returns the current phase and failure count without triggering any
    /// transition. The OPEN -> HALF_OPEN flip only happens inside
    /// [`Self::can_execute`].
    #[must_use]
    pub fn state(&self) -> BreakerSnapshot {
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        BreakerSnapshot {
            phase: inner.phase,
            consecutive_failures: inner.consecutive_failures,
        }
    }

    fn publish_state(phase: BreakerPhase) {
        metrics::gauge!("downstream_circuit_breaker_state").set(f64::from(phase.metric_value()));
    }
}
