//! Calendar/solar feature store. Features are cheap to derive, so the store
//! stays in memory and never writes a snapshot.

use super::{DataStore, StoreCore, StoreKind};
use crate::data::calendar::CalendarFeatures;
use crate::data::fallback::{FallbackOrchestrator, RetryPolicy};
use crate::data::planner::PlannerConstraints;
use crate::region::Region;
use crate::schedule::{FixedInterval, RevalidationPolicy};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct CalendarStore {
    core: StoreCore,
    orchestrator: FallbackOrchestrator,
    schedule: FixedInterval,
}

impl CalendarStore {
    pub fn new(region: Arc<Region>, schedule: FixedInterval) -> Self {
        let label = format!("{}/{}", region.bidding_zone, StoreKind::Calendar);
        let orchestrator = FallbackOrchestrator::new(label).with_provider(
            Arc::new(CalendarFeatures::new(Arc::clone(&region))),
            RetryPolicy::none(),
        );
        Self {
            core: StoreCore::new(StoreKind::Calendar, region, None),
            orchestrator,
            schedule,
        }
    }
}

impl DataStore for CalendarStore {
    fn core(&self) -> &StoreCore {
        &self.core
    }

    fn fetch_missing_data(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.core
            .fetch_missing(start, end, &PlannerConstraints::default(), &self.orchestrator)
    }

    fn next_revalidation_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let cache = self.core.read();
        self.schedule
            .next_revalidation_time(&cache, self.core.region(), now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::calendar::HOLIDAY_COLUMN;
    use crate::region::RegionName;
    use chrono::{Duration, TimeZone};

    #[test]
    fn derives_whole_local_days() {
        let store = CalendarStore::new(RegionName::DE.region(), FixedInterval::new(Duration::hours(24)));
        // 2025-12-24 00:00 .. 2025-12-26 00:00 Berlin
        let start = Utc.with_ymd_and_hms(2025, 12, 23, 23, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 12, 25, 23, 0, 0).unwrap();

        let frame = store.get(start, end);
        // noon on the 26th lies past `end`
        assert_eq!(store.core().len(), 192);
        assert_eq!(frame.len(), 192);
        let christmas = Utc.with_ymd_and_hms(2025, 12, 25, 11, 0, 0).unwrap();
        assert_eq!(frame.value_at(christmas, HOLIDAY_COLUMN), Some(1.0));
        assert!(store.core().snapshot_path().is_none());
    }

    #[test]
    fn revalidates_daily() {
        let store = CalendarStore::new(RegionName::AT.region(), FixedInterval::new(Duration::hours(24)));
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 6, 0, 0).unwrap();
        assert_eq!(store.next_revalidation_time(now), now + Duration::hours(24));
    }
}
