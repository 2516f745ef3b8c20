//! Circuit breaker shared by the HTTP providers.
//!
//! HTTP 403 opens the breaker at once; 429 and 5xx responses open it after
//! `failure_threshold` of them in a row. While open, the provider reports
//! itself unavailable and the fallback chain skips it.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;

/// Why a breaker opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripCause {
    /// The upstream refused us outright (403).
    Forbidden,
    /// Rate limits or server errors, `failure_threshold` times in a row.
    RepeatedFailures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Closed { failures: u32 },
    Open { until: Instant, cause: TripCause },
}

#[derive(Debug)]
pub struct CircuitBreaker {
    gate: Mutex<Gate>,
    cooldown: Duration,
    failure_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration, failure_threshold: u32) -> Self {
        Self {
            gate: Mutex::new(Gate::Closed { failures: 0 }),
            cooldown,
            failure_threshold: failure_threshold.max(1),
        }
    }

    fn gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self, gate: &mut Gate, cause: TripCause) {
        warn!(?cause, cooldown_secs = self.cooldown.as_secs(), "circuit breaker open");
        *gate = Gate::Open {
            until: Instant::now() + self.cooldown,
            cause,
        };
    }

    /// Whether a request may go out. An expired cooldown closes the breaker.
    pub fn is_allowed(&self) -> bool {
        let mut gate = self.gate();
        match *gate {
            Gate::Closed { .. } => true,
            Gate::Open { until, .. } if Instant::now() >= until => {
                *gate = Gate::Closed { failures: 0 };
                true
            }
            Gate::Open { .. } => false,
        }
    }

    pub fn record_success(&self) {
        let mut gate = self.gate();
        if let Gate::Closed { failures } = &mut *gate {
            *failures = 0;
        }
    }

    /// Count a rate limit or server error.
    pub fn record_failure(&self) {
        let mut gate = self.gate();
        let Gate::Closed { failures } = &mut *gate else {
            return;
        };
        *failures += 1;
        if *failures >= self.failure_threshold {
            self.open(&mut gate, TripCause::RepeatedFailures);
        }
    }

    /// Open immediately, e.g. after a 403.
    pub fn trip(&self) {
        let mut gate = self.gate();
        self.open(&mut gate, TripCause::Forbidden);
    }

    /// Why the breaker is open, if it is.
    pub fn cause(&self) -> Option<TripCause> {
        match *self.gate() {
            Gate::Open { cause, .. } => Some(cause),
            Gate::Closed { .. } => None,
        }
    }

    /// Time left until requests are allowed again (zero if closed).
    pub fn remaining_cooldown(&self) -> Duration {
        match *self.gate() {
            Gate::Closed { .. } => Duration::ZERO,
            Gate::Open { until, .. } => until.saturating_duration_since(Instant::now()),
        }
    }
}

impl Default for CircuitBreaker {
    /// 30-minute cooldown after 3 failures in a row.
    fn default() -> Self {
        Self::new(Duration::from_secs(30 * 60), 3)
    }
}
