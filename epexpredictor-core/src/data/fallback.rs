//! Ordered provider chain with per-provider retry.
//!
//! For each planned window the chain asks providers in order. The first one
//! to return a non-empty frame wins; failures and empty answers fall through
//! to the next provider. When every provider comes up empty the window is
//! simply left unfilled and a later call plans it again.

use super::frame::Frame;
use super::provider::{FetchError, FetchWindow, Provider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
}

/// How often, and how patiently, one provider is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
            backoff: Backoff::Fixed,
        }
    }

    /// Sleep before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => self
                .delay
                .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1))),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(60),
            backoff: Backoff::Fixed,
        }
    }
}

struct ProviderSlot {
    provider: Arc<dyn Provider>,
    retry: RetryPolicy,
}

/// The rows one provider delivered for one window.
#[derive(Debug, Clone)]
pub struct FetchedWindow {
    pub provider: String,
    pub frame: Frame,
    pub attempts: u32,
}

pub struct FallbackOrchestrator {
    label: String,
    slots: Vec<ProviderSlot>,
}

impl FallbackOrchestrator {
    /// `label` identifies the owning store in log lines, e.g. `DE-LU/prices`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            slots: Vec::new(),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn Provider>, retry: RetryPolicy) -> Self {
        self.slots.push(ProviderSlot { provider, retry });
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.provider.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Fetch `window` from the first provider that has data for it.
    pub fn fetch(&self, window: &FetchWindow) -> Option<FetchedWindow> {
        for slot in &self.slots {
            let name = slot.provider.name();
            if !slot.provider.is_available() {
                debug!(store = %self.label, provider = name, "provider unavailable, skipping");
                continue;
            }

            match fetch_with_retry(slot, window) {
                (Ok(frame), attempts) if !frame.is_empty() => {
                    debug!(
                        store = %self.label,
                        provider = name,
                        %window,
                        rows = frame.len(),
                        attempts,
                        "window fetched"
                    );
                    return Some(FetchedWindow {
                        provider: name.to_string(),
                        frame,
                        attempts,
                    });
                }
                (Ok(_), _) => {
                    debug!(store = %self.label, provider = name, %window, "provider has no data");
                }
                (Err(e), attempts) => {
                    warn!(
                        store = %self.label,
                        provider = name,
                        %window,
                        attempts,
                        error = %e,
                        "fetch failed, trying next provider"
                    );
                }
            }
        }
        None
    }
}

fn fetch_with_retry(slot: &ProviderSlot, window: &FetchWindow) -> (Result<Frame, FetchError>, u32) {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match slot.provider.fetch(window) {
            Err(e) if e.is_transient() && attempt <= slot.retry.max_retries => {
                let delay = slot.retry.delay_for(attempt);
                debug!(
                    provider = slot.provider.name(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                std::thread::sleep(delay);
            }
            result => return (result, attempt),
        }
    }
}
