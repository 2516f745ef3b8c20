//! Delta-fetching data stores.
//!
//! Each store owns one [`TimeSeriesCache`] for one region. Reads never touch
//! the network; [`DataStore::get`] first plans the missing local days, fetches
//! them through the store's provider chain, merges and persists, then slices.

pub mod calendar;
pub mod price;
pub mod set;
pub mod weather;

pub use calendar::CalendarStore;
pub use price::PriceStore;
pub use set::RegionStores;
pub use weather::WeatherStore;

use crate::data::cache::TimeSeriesCache;
use crate::data::fallback::FallbackOrchestrator;
use crate::data::frame::Frame;
use crate::data::planner::{plan_gaps, Gap, PlannerConstraints};
use crate::data::provider::FetchError;
use crate::data::snapshot::{SnapshotError, SnapshotFile};
use crate::region::Region;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("provider setup failed: {0}")]
    Provider(#[from] FetchError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Price,
    Weather,
    Calendar,
}

impl StoreKind {
    pub const ALL: [StoreKind; 3] = [StoreKind::Price, StoreKind::Weather, StoreKind::Calendar];

    /// Snapshot file prefix and log label.
    pub fn as_str(self) -> &'static str {
        match self {
            StoreKind::Price => "prices",
            StoreKind::Weather => "weather",
            StoreKind::Calendar => "calendar",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State and fetch pipeline shared by every store.
///
/// Two locks: the row table sits behind an `RwLock` so readers only ever
/// wait for a merge, and a separate fetch mutex serializes the whole
/// plan → fetch → merge → persist sequence. A caller that blocked on the
/// fetch mutex plans again afterwards and finds the gaps already filled.
pub struct StoreCore {
    kind: StoreKind,
    region: Arc<Region>,
    cache: RwLock<TimeSeriesCache>,
    fetch_lock: Mutex<()>,
    snapshot: Option<SnapshotFile>,
}

impl StoreCore {
    /// Create a store core, restoring the snapshot under `storage_dir` if one exists.
    pub fn new(kind: StoreKind, region: Arc<Region>, storage_dir: Option<&Path>) -> Self {
        let snapshot =
            storage_dir.map(|dir| SnapshotFile::new(dir, kind.as_str(), &region.bidding_zone));
        let core = Self {
            kind,
            region,
            cache: RwLock::new(TimeSeriesCache::new()),
            fetch_lock: Mutex::new(()),
            snapshot,
        };
        core.load();
        core
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    pub fn region(&self) -> &Arc<Region> {
        &self.region
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_ref().map(SnapshotFile::path)
    }

    /// `zone/kind`, as used in log lines.
    pub fn label(&self) -> String {
        format!("{}/{}", self.region.bidding_zone, self.kind)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, TimeSeriesCache> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TimeSeriesCache> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_fetch(&self) -> MutexGuard<'_, ()> {
        self.fetch_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the in-memory table with the persisted snapshot. Returns
    /// whether a snapshot was restored; an unreadable one is quarantined.
    pub fn load(&self) -> bool {
        let Some(snapshot) = &self.snapshot else {
            return false;
        };
        let _guard = self.lock_fetch();
        match snapshot.load_or_quarantine() {
            Some(cache) => {
                info!(
                    zone = %self.region.bidding_zone,
                    kind = %self.kind,
                    rows = cache.len(),
                    last = ?cache.last_time(),
                    "restored snapshot"
                );
                *self.write() = cache;
                true
            }
            None => false,
        }
    }

    pub fn get_known(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Frame {
        self.read().get_known(start, end)
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.read().contains(t)
    }

    pub fn first_known(&self) -> Option<DateTime<Utc>> {
        self.read().first_time()
    }

    pub fn last_known(&self) -> Option<DateTime<Utc>> {
        self.read().last_time()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Fetch whatever part of `[start, end]` is not cached yet.
    pub fn fetch_missing(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        constraints: &PlannerConstraints,
        orchestrator: &FallbackOrchestrator,
    ) -> bool {
        let _guard = self.lock_fetch();
        let gaps = {
            let cache = self.read();
            plan_gaps(|t| cache.contains(t), self.region.timezone, start, end, constraints)
        };
        if gaps.is_empty() {
            debug!(zone = %self.region.bidding_zone, kind = %self.kind, %start, %end, "range already cached");
            return false;
        }
        self.fill_gaps(&gaps, orchestrator)
    }

    /// Fetch `[start, end]` again even where it is cached.
    pub fn refetch(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        constraints: &PlannerConstraints,
        orchestrator: &FallbackOrchestrator,
    ) -> bool {
        let _guard = self.lock_fetch();
        let gaps = plan_gaps(|_| false, self.region.timezone, start, end, constraints);
        self.fill_gaps(&gaps, orchestrator)
    }

    // Caller holds the fetch lock.
    fn fill_gaps(&self, gaps: &[Gap], orchestrator: &FallbackOrchestrator) -> bool {
        let tz = self.region.timezone;
        let mut written = 0;
        for gap in gaps {
            let window = gap.window(tz);
            debug!(
                zone = %self.region.bidding_zone,
                kind = %self.kind,
                start = %window.start,
                end = %window.end,
                "fetching gap"
            );
            if let Some(fetched) = orchestrator.fetch(&window) {
                written += self.write().merge(&fetched.frame);
            }
        }

        if written == 0 {
            info!(
                zone = %self.region.bidding_zone,
                kind = %self.kind,
                last_known = ?self.last_known(),
                "no provider had new data; {} available until {}",
                self.kind,
                self.last_known()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string()),
            );
            return false;
        }

        info!(
            zone = %self.region.bidding_zone,
            kind = %self.kind,
            rows = written,
            last_known = ?self.last_known(),
            "data updated"
        );
        if let Err(e) = self.persist_locked() {
            warn!(zone = %self.region.bidding_zone, kind = %self.kind, error = %e, "failed to persist snapshot");
        }
        true
    }

    /// Drop rows strictly before `cutoff`, persisting if anything went.
    pub fn drop_before(&self, cutoff: DateTime<Utc>) -> usize {
        let _guard = self.lock_fetch();
        let removed = self.write().drop_before(cutoff);
        self.persist_after_drop(removed)
    }

    /// Drop rows strictly after `cutoff`, persisting if anything went.
    pub fn drop_after(&self, cutoff: DateTime<Utc>) -> usize {
        let _guard = self.lock_fetch();
        let removed = self.write().drop_after(cutoff);
        self.persist_after_drop(removed)
    }

    fn persist_after_drop(&self, removed: usize) -> usize {
        if removed > 0 {
            debug!(zone = %self.region.bidding_zone, kind = %self.kind, removed, "dropped rows");
            if let Err(e) = self.persist_locked() {
                warn!(zone = %self.region.bidding_zone, kind = %self.kind, error = %e, "failed to persist snapshot");
            }
        }
        removed
    }

    /// Write the snapshot now. A no-op for in-memory stores.
    pub fn serialize(&self) -> Result<(), SnapshotError> {
        let _guard = self.lock_fetch();
        self.persist_locked()
    }

    // Caller holds the fetch lock, so no merge can slip in between the
    // write and `mark_clean`.
    fn persist_locked(&self) -> Result<(), SnapshotError> {
        let Some(snapshot) = &self.snapshot else {
            self.write().mark_clean();
            return Ok(());
        };
        {
            let cache = self.read();
            snapshot.write(&cache)?;
        }
        self.write().mark_clean();
        Ok(())
    }
}

/// The capability every store offers.
pub trait DataStore: Send + Sync {
    fn core(&self) -> &StoreCore;

    /// Fetch the missing part of `[start, end]`. Returns whether new rows
    /// were merged. Upstream failures are logged, never returned.
    fn fetch_missing_data(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool;

    /// The earliest instant at which re-checking upstream is worthwhile.
    fn next_revalidation_time(&self, now: DateTime<Utc>) -> DateTime<Utc>;

    fn kind(&self) -> StoreKind {
        self.core().kind()
    }

    /// Cached rows in `[start, end]`, without fetching.
    fn get_known(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Frame {
        self.core().get_known(start, end)
    }

    /// Fetch what is missing, then return the cached rows in `[start, end]`.
    fn get(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Frame {
        self.fetch_missing_data(start, end);
        self.get_known(start, end)
    }

    fn drop_before(&self, cutoff: DateTime<Utc>) -> usize {
        self.core().drop_before(cutoff)
    }

    fn drop_after(&self, cutoff: DateTime<Utc>) -> usize {
        self.core().drop_after(cutoff)
    }

    fn serialize(&self) -> Result<(), SnapshotError> {
        self.core().serialize()
    }
}
