//! When a store's data is next worth re-checking upstream.

use crate::data::cache::TimeSeriesCache;
use crate::data::planner::{probe_instant, resolve_local};
use crate::region::Region;
use chrono::{DateTime, Duration, NaiveTime, Utc};

pub trait RevalidationPolicy: Send + Sync {
    fn next_revalidation_time(
        &self,
        cache: &TimeSeriesCache,
        region: &Region,
        now: DateTime<Utc>,
    ) -> DateTime<Utc>;
}

/// Day-ahead auction schedule: next-day prices appear once a day around
/// `publication_time` local.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicationSchedule {
    pub publication_time: NaiveTime,
    /// Poll interval once publication is due but data has not arrived.
    pub imminent_poll: Duration,
    /// Poll interval when everything up to the day after tomorrow is known.
    pub slow_poll: Duration,
}

impl Default for PublicationSchedule {
    fn default() -> Self {
        Self {
            publication_time: NaiveTime::from_hms_opt(13, 0, 0).unwrap_or(NaiveTime::MIN),
            imminent_poll: Duration::minutes(5),
            slow_poll: Duration::hours(12),
        }
    }
}

impl RevalidationPolicy for PublicationSchedule {
    fn next_revalidation_time(
        &self,
        cache: &TimeSeriesCache,
        region: &Region,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let tz = region.timezone;
        let local_now = now.with_timezone(&tz);
        let today = local_now.date_naive();
        let (Some(tomorrow), Some(day_after)) = (
            today.succ_opt(),
            today.succ_opt().and_then(|d| d.succ_opt()),
        ) else {
            return now + self.slow_poll;
        };

        if cache.contains(probe_instant(day_after, tz)) {
            return now + self.slow_poll;
        }
        if cache.contains(probe_instant(tomorrow, tz)) {
            return resolve_local(tz, tomorrow.and_time(self.publication_time));
        }
        if local_now.time() < self.publication_time {
            resolve_local(tz, today.and_time(self.publication_time))
        } else {
            now + self.imminent_poll
        }
    }
}

/// Re-check every `interval`, regardless of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedInterval {
    pub interval: Duration,
}

impl FixedInterval {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl RevalidationPolicy for FixedInterval {
    fn next_revalidation_time(
        &self,
        _cache: &TimeSeriesCache,
        _region: &Region,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        now + self.interval
    }
}
