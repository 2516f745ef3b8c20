//! Missing-range planning.
//!
//! Coverage is tested per local calendar day by probing a single instant,
//! local noon. A day whose probe is absent from the cache is missing. Runs of
//! consecutive missing days become one [`Gap`], subject to the provider's
//! span limit and an optional boundary instant that no gap may straddle.

use super::provider::FetchWindow;
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Local time of day used to probe whether a day is cached.
pub const PROBE_TIME: NaiveTime = match NaiveTime::from_hms_opt(12, 0, 0) {
    Some(t) => t,
    None => NaiveTime::MIN,
};

/// Per-provider limits applied while grouping missing days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlannerConstraints {
    /// Longest range, in days, the provider accepts in one request.
    pub max_span_days: Option<u32>,
    /// Instant at which the provider switches endpoints. A gap never
    /// contains days on both sides of it.
    pub switch_at: Option<DateTime<Utc>>,
}

impl PlannerConstraints {
    pub fn max_span(days: u32) -> Self {
        Self {
            max_span_days: Some(days),
            switch_at: None,
        }
    }

    pub fn with_switch_at(mut self, at: DateTime<Utc>) -> Self {
        self.switch_at = Some(at);
        self
    }
}

/// A run of consecutive missing local days, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
}

impl Gap {
    pub fn days(&self) -> i64 {
        (self.last_day - self.first_day).num_days() + 1
    }

    /// Local midnight of the first day up to local midnight after the last.
    pub fn window(&self, tz: Tz) -> FetchWindow {
        let after_last = self.last_day.succ_opt().unwrap_or(self.last_day);
        FetchWindow::new(local_midnight(self.first_day, tz), local_midnight(after_last, tz))
    }
}

/// Resolve a local wall-clock time to UTC. Ambiguous times take the earlier
/// instant; times skipped by a DST jump move forward one hour.
pub fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => t.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive)),
    }
}

pub fn local_midnight(day: NaiveDate, tz: Tz) -> DateTime<Utc> {
    resolve_local(tz, day.and_time(NaiveTime::MIN))
}

/// The instant checked to decide whether `day` is cached.
pub fn probe_instant(day: NaiveDate, tz: Tz) -> DateTime<Utc> {
    resolve_local(tz, day.and_time(PROBE_TIME))
}

pub fn local_day(t: DateTime<Utc>, tz: Tz) -> NaiveDate {
    t.with_timezone(&tz).date_naive()
}

/// Plan the fetches needed to cover `[start, end]`.
///
/// Days are walked from the local day containing `start` while their probe
/// is at or before `end`. Returned gaps are ordered, disjoint, and cover
/// exactly the walked days whose probe `is_known` rejects.
pub fn plan_gaps<F>(
    is_known: F,
    tz: Tz,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    constraints: &PlannerConstraints,
) -> Vec<Gap>
where
    F: Fn(DateTime<Utc>) -> bool,
{
    let mut gaps = Vec::new();
    let mut open: Option<NaiveDate> = None;
    let mut day = local_day(start, tz);

    loop {
        let probe = probe_instant(day, tz);
        if probe > end {
            break;
        }
        if open.is_none() && !is_known(probe) {
            open = Some(day);
        }

        let next = day.succ_opt();
        if let Some(first_day) = open {
            let close = match next {
                None => true,
                Some(next) => {
                    let next_probe = probe_instant(next, tz);
                    let span_full = constraints
                        .max_span_days
                        .is_some_and(|max| (day - first_day).num_days() + 1 >= i64::from(max));
                    let crosses = constraints
                        .switch_at
                        .is_some_and(|at| (probe < at) != (next_probe < at));
                    next_probe > end || is_known(next_probe) || span_full || crosses
                }
            };
            if close {
                gaps.push(Gap {
                    first_day,
                    last_day: day,
                });
                open = None;
            }
        }

        match next {
            Some(next) => day = next,
            None => break,
        }
    }

    gaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const BERLIN: Tz = chrono_tz::Europe::Berlin;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn utc(y: i32, m: u32, day: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, day, h, 0, 0).unwrap()
    }

    #[test]
    fn probe_is_local_noon() {
        assert_eq!(probe_instant(d(2025, 1, 15), BERLIN), utc(2025, 1, 15, 11));
        assert_eq!(probe_instant(d(2025, 7, 15), BERLIN), utc(2025, 7, 15, 10));
    }

    #[test]
    fn gap_window_spans_local_midnights() {
        let gap = Gap {
            first_day: d(2025, 1, 1),
            last_day: d(2025, 1, 2),
        };
        let window = gap.window(BERLIN);
        assert_eq!(window.start, utc(2024, 12, 31, 23));
        assert_eq!(window.end, utc(2025, 1, 2, 23));
        assert_eq!(gap.days(), 2);
    }

    #[test]
    fn dst_day_window_is_23_hours() {
        let gap = Gap {
            first_day: d(2025, 3, 30),
            last_day: d(2025, 3, 30),
        };
        let window = gap.window(BERLIN);
        assert_eq!(window.end - window.start, Duration::hours(23));
    }

    #[test]
    fn empty_cache_yields_one_gap() {
        let gaps = plan_gaps(
            |_| false,
            chrono_tz::UTC,
            utc(2025, 1, 1, 0),
            utc(2025, 1, 5, 23),
            &PlannerConstraints::default(),
        );
        assert_eq!(
            gaps,
            vec![Gap {
                first_day: d(2025, 1, 1),
                last_day: d(2025, 1, 5)
            }]
        );
    }

    #[test]
    fn final_missing_day_is_included() {
        let known: HashSet<DateTime<Utc>> = [probe_instant(d(2025, 1, 1), chrono_tz::UTC)].into();
        let gaps = plan_gaps(
            |t| known.contains(&t),
            chrono_tz::UTC,
            utc(2025, 1, 1, 0),
            utc(2025, 1, 2, 12),
            &PlannerConstraints::default(),
        );
        assert_eq!(
            gaps,
            vec![Gap {
                first_day: d(2025, 1, 2),
                last_day: d(2025, 1, 2)
            }]
        );
    }

    #[test]
    fn known_days_split_gaps() {
        let known: HashSet<DateTime<Utc>> = [
            probe_instant(d(2025, 1, 2), chrono_tz::UTC),
            probe_instant(d(2025, 1, 3), chrono_tz::UTC),
        ]
        .into();
        let gaps = plan_gaps(
            |t| known.contains(&t),
            chrono_tz::UTC,
            utc(2025, 1, 1, 0),
            utc(2025, 1, 5, 12),
            &PlannerConstraints::default(),
        );
        assert_eq!(gaps.len(), 2);
        assert_eq!(gaps[0].last_day, d(2025, 1, 1));
        assert_eq!(gaps[1].first_day, d(2025, 1, 4));
        assert_eq!(gaps[1].last_day, d(2025, 1, 5));
    }

    #[test]
    fn fully_known_range_needs_nothing() {
        let gaps = plan_gaps(
            |_| true,
            BERLIN,
            utc(2025, 1, 1, 0),
            utc(2025, 2, 1, 0),
            &PlannerConstraints::default(),
        );
        assert!(gaps.is_empty());
    }

    #[test]
    fn span_limit_splits_long_gaps() {
        let gaps = plan_gaps(
            |_| false,
            chrono_tz::UTC,
            utc(2025, 1, 1, 0),
            utc(2025, 1, 10, 12),
            &PlannerConstraints::max_span(4),
        );
        let spans: Vec<i64> = gaps.iter().map(Gap::days).collect();
        assert_eq!(spans, vec![4, 4, 2]);
    }

    #[test]
    fn switch_instant_splits_gap() {
        let constraints = PlannerConstraints::default().with_switch_at(utc(2025, 1, 3, 18));
        let gaps = plan_gaps(
            |_| false,
            chrono_tz::UTC,
            utc(2025, 1, 1, 0),
            utc(2025, 1, 5, 12),
            &constraints,
        );
        assert_eq!(gaps.len(), 2);
        assert_eq!(gaps[0].last_day, d(2025, 1, 3));
        assert_eq!(gaps[1].first_day, d(2025, 1, 4));
    }

    #[test]
    fn end_before_first_probe_plans_nothing() {
        let gaps = plan_gaps(
            |_| false,
            chrono_tz::UTC,
            utc(2025, 1, 1, 0),
            utc(2025, 1, 1, 6),
            &PlannerConstraints::default(),
        );
        assert!(gaps.is_empty());
    }
}
