//! Property tests for cache and planner invariants.
//!
//! Uses proptest to verify:
//! 1. Merge idempotence: merging the same frame twice equals merging it once
//! 2. Ordering: the cache timeline is strictly increasing after any merges
//! 3. Gap completeness: every missing day in range is in exactly one gap
//! 4. Retention: drop_before removes exactly the rows older than the cutoff

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use proptest::prelude::*;
use std::collections::HashSet;

use epexpredictor_core::data::planner::{local_midnight, probe_instant, PlannerConstraints};
use epexpredictor_core::data::{plan_gaps, Frame, TimeSeriesCache};

// ── Strategies (proptest) ────────────────────────────────────────────

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 20, 0, 0, 0).unwrap()
}

fn arb_value() -> impl Strategy<Value = f64> {
    prop_oneof![
        4 => (-50.0..400.0_f64),
        1 => Just(f64::NAN),
    ]
}

/// Rows on the 15-minute grid within ~5 days, possibly repeated.
fn arb_frame() -> impl Strategy<Value = Frame> {
    prop::collection::vec((0i64..480, arb_value(), arb_value()), 0..120).prop_map(|rows| {
        let mut frame = Frame::new(["price", "wind_0"]);
        for (slot, a, b) in rows {
            frame.push(base() + Duration::minutes(15 * slot), vec![a, b]);
        }
        frame
    })
}

fn arb_tz() -> impl Strategy<Value = Tz> {
    prop_oneof![
        Just(chrono_tz::UTC),
        Just(chrono_tz::Europe::Berlin),
        Just(chrono_tz::Europe::Amsterdam),
    ]
}

/// Known flags for 40 consecutive days around the spring DST switch.
fn arb_known_days() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 40)
}

fn first_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

fn snapshot(cache: &TimeSeriesCache) -> Vec<(DateTime<Utc>, Vec<u64>)> {
    cache
        .iter()
        .map(|(t, values)| (t, values.iter().map(|v| v.to_bits()).collect()))
        .collect()
}

// ── 1. Merge Idempotence ─────────────────────────────────────────────

proptest! {
    #[test]
    fn merge_is_idempotent(frame in arb_frame()) {
        let mut once = TimeSeriesCache::new();
        once.merge(&frame);

        let mut twice = TimeSeriesCache::new();
        twice.merge(&frame);
        twice.merge(&frame);

        prop_assert_eq!(snapshot(&once), snapshot(&twice));
    }
}

// ── 2. Ordering ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn timeline_stays_strictly_increasing(frames in prop::collection::vec(arb_frame(), 1..5)) {
        let mut cache = TimeSeriesCache::new();
        for frame in &frames {
            cache.merge(frame);
        }
        let times: Vec<_> = cache.iter().map(|(t, _)| t).collect();
        for pair in times.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
        for (_, values) in cache.iter() {
            prop_assert!(values.iter().any(|v| !v.is_nan()), "all-NaN row stored");
        }
    }
}

// ── 3. Gap Completeness ──────────────────────────────────────────────

proptest! {
    #[test]
    fn gaps_cover_missing_days_exactly(
        known in arb_known_days(),
        tz in arb_tz(),
        max_span in prop::option::of(1u32..10),
    ) {
        let days: Vec<NaiveDate> = (0..known.len())
            .map(|i| first_day() + Duration::days(i as i64))
            .collect();
        let known_probes: HashSet<DateTime<Utc>> = days
            .iter()
            .zip(&known)
            .filter(|(_, &k)| k)
            .map(|(d, _)| probe_instant(*d, tz))
            .collect();

        let start = local_midnight(days[0], tz);
        let end = probe_instant(days[days.len() - 1], tz);
        let constraints = PlannerConstraints { max_span_days: max_span, switch_at: None };
        let gaps = plan_gaps(|t| known_probes.contains(&t), tz, start, end, &constraints);

        // ordered and disjoint
        for pair in gaps.windows(2) {
            prop_assert!(pair[0].last_day < pair[1].first_day);
        }

        let mut covered = HashSet::new();
        for gap in &gaps {
            prop_assert!(gap.first_day <= gap.last_day);
            if let Some(max) = max_span {
                prop_assert!(gap.days() <= i64::from(max));
            }
            let mut d = gap.first_day;
            while d <= gap.last_day {
                prop_assert!(!known_probes.contains(&probe_instant(d, tz)), "known day {} in gap", d);
                covered.insert(d);
                d = d.succ_opt().unwrap();
            }
        }

        for (day, &k) in days.iter().zip(&known) {
            prop_assert_eq!(covered.contains(day), !k, "day {}", day);
        }
    }
}

// ── 4. Retention ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn drop_before_keeps_exactly_newer_rows(frame in arb_frame(), cutoff_slot in 0i64..480) {
        let mut cache = TimeSeriesCache::new();
        cache.merge(&frame);
        let cutoff = base() + Duration::minutes(15 * cutoff_slot);
        let older = cache.iter().filter(|(t, _)| *t < cutoff).count();
        let total = cache.len();

        let removed = cache.drop_before(cutoff);

        prop_assert_eq!(removed, older);
        prop_assert_eq!(cache.len(), total - older);
        prop_assert!(cache.iter().all(|(t, _)| t >= cutoff));
    }
}
