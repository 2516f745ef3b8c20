//! Per-region refresh coordination.
//!
//! ```text
//! Cold ──first caller──▶ Refreshing{warmed: false} ──▶ Warm
//!                                                        │ next_refresh due
//!                         Warm ◀── Refreshing{warmed: true} ◀┘ (background)
//! ```
//!
//! Callers that arrive during the cold refresh block until it finishes.
//! Once warm, callers never wait: a due refresh runs on a background thread
//! and at most one refresh is ever in flight. A target that already holds
//! data (restored from snapshots) starts warm with a refresh due at once.

use crate::store::StoreKind;
use chrono::{DateTime, Duration, Utc};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::{debug, info, warn};

/// Retry delay after a refresh panicked on an already warm region.
const PANIC_RETRY_MINUTES: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Stores that merged new rows.
    pub updated: Vec<StoreKind>,
    pub next_refresh: DateTime<Utc>,
}

/// Something a [`WarmCoordinator`] can refresh.
pub trait Refresh: Send + Sync + 'static {
    fn refresh(&self, now: DateTime<Utc>) -> RefreshOutcome;

    /// Whether there is already data to serve before the first refresh.
    fn is_populated(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmState {
    Cold,
    Refreshing { warmed: bool },
    Warm { next_refresh: DateTime<Utc> },
}

struct Shared<R> {
    target: Arc<R>,
    state: Mutex<WarmState>,
    idle: Condvar,
    refreshes: AtomicUsize,
}

impl<R: Refresh> Shared<R> {
    fn lock(&self) -> MutexGuard<'_, WarmState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, now: DateTime<Utc>, warmed: bool) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.target.refresh(now)));
        let next = match outcome {
            Ok(outcome) => {
                info!(
                    updated = ?outcome.updated,
                    next_refresh = %outcome.next_refresh,
                    "refresh finished"
                );
                WarmState::Warm {
                    next_refresh: outcome.next_refresh,
                }
            }
            Err(_) if warmed => {
                warn!("refresh panicked, keeping previous data");
                WarmState::Warm {
                    next_refresh: now + Duration::minutes(PANIC_RETRY_MINUTES),
                }
            }
            Err(_) => {
                warn!("initial refresh panicked, region stays cold");
                WarmState::Cold
            }
        };
        *self.lock() = next;
        self.idle.notify_all();
    }
}

pub struct WarmCoordinator<R> {
    shared: Arc<Shared<R>>,
}

impl<R: Refresh> WarmCoordinator<R> {
    pub fn new(target: Arc<R>) -> Self {
        let initial = if target.is_populated() {
            WarmState::Warm {
                next_refresh: DateTime::<Utc>::MIN_UTC,
            }
        } else {
            WarmState::Cold
        };
        Self {
            shared: Arc::new(Shared {
                target,
                state: Mutex::new(initial),
                idle: Condvar::new(),
                refreshes: AtomicUsize::new(0),
            }),
        }
    }

    pub fn target(&self) -> &Arc<R> {
        &self.shared.target
    }

    pub fn state(&self) -> WarmState {
        *self.shared.lock()
    }

    /// Number of refreshes started so far.
    pub fn refresh_count(&self) -> usize {
        self.shared.refreshes.load(Ordering::SeqCst)
    }

    /// Make sure the region has been refreshed at least once, and kick off a
    /// background refresh if one is due. Returns the state seen on exit.
    pub fn ensure_warm(&self, now: DateTime<Utc>) -> WarmState {
        let mut state = self.shared.lock();
        loop {
            match *state {
                WarmState::Cold => {
                    *state = WarmState::Refreshing { warmed: false };
                    drop(state);
                    debug!("cold start, refreshing inline");
                    self.shared.run(now, false);
                    return self.state();
                }
                WarmState::Refreshing { warmed: false } => {
                    state = self
                        .shared
                        .idle
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                WarmState::Warm { next_refresh } if now >= next_refresh => {
                    *state = WarmState::Refreshing { warmed: true };
                    drop(state);
                    self.spawn_refresh(now);
                    return WarmState::Refreshing { warmed: true };
                }
                current => return current,
            }
        }
    }

    fn spawn_refresh(&self, now: DateTime<Utc>) {
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("epex-refresh".to_string())
            .spawn(move || shared.run(now, true));
        if let Err(e) = spawned {
            warn!(error = %e, "could not spawn refresh thread, refreshing inline");
            self.shared.run(now, true);
        }
    }

    /// Block until no refresh is in flight.
    pub fn wait_idle(&self) -> WarmState {
        let mut state = self.shared.lock();
        while matches!(*state, WarmState::Refreshing { .. }) {
            state = self
                .shared
                .idle
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *state
    }
}
