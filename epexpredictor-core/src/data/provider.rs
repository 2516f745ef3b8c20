//! Provider trait and structured fetch errors.
//!
//! A provider turns a [`FetchWindow`] into a [`Frame`] on the 15-minute grid.
//! Providers know nothing about caching; stores decide what to ask for.

use super::frame::Frame;
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

/// Half-open interval `[start, end)` handed to a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%Y-%m-%dT%H:%MZ"),
            self.end.format("%Y-%m-%dT%H:%MZ")
        )
    }
}

/// Why a fetch failed. None of these ever reach a store's caller; the
/// fallback layer logs them and moves on.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("provider returned HTTP {status}: {context}")]
    Http { status: u16, context: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),

    #[error("hard stop: provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,
}

impl FetchError {
    /// Whether another attempt against the same provider could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::NetworkUnreachable(_)
            | FetchError::Timeout(_)
            | FetchError::RateLimited { .. }
            | FetchError::ResponseFormatChanged(_) => true,
            FetchError::Http { status, .. } => *status >= 500,
            FetchError::AuthenticationRequired(_)
            | FetchError::NotConfigured(_)
            | FetchError::CircuitBreakerTripped => false,
        }
    }
}

/// A remote (or computed) source of time-series rows.
pub trait Provider: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Fetch rows covering `window`. An empty frame means the provider has
    /// no data for the window yet, which is not an error.
    fn fetch(&self, window: &FetchWindow) -> Result<Frame, FetchError>;

    /// Whether the provider is worth asking right now (configured, breaker closed).
    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_is_half_open() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let window = FetchWindow::new(start, end);
        assert!(window.contains(start));
        assert!(!window.contains(end));
        assert_eq!(window.to_string(), "[2025-01-01T00:00Z, 2025-01-02T00:00Z)");
    }

    #[test]
    fn transient_classification() {
        assert!(FetchError::Timeout("8s".into()).is_transient());
        assert!(FetchError::Http { status: 503, context: String::new() }.is_transient());
        assert!(!FetchError::Http { status: 404, context: String::new() }.is_transient());
        assert!(!FetchError::CircuitBreakerTripped.is_transient());
        assert!(!FetchError::NotConfigured("api key".into()).is_transient());
    }
}
