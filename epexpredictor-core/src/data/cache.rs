//! In-memory time-series cache.
//!
//! One row per 15-minute UTC instant, kept ordered and unique by a `BTreeMap`.
//! Columns are discovered from merged frames; a column the cache has never
//! seen is added on merge with `NaN` for all earlier rows.

use super::frame::{Frame, TimeSeriesRow};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct TimeSeriesCache {
    columns: Vec<String>,
    rows: BTreeMap<DateTime<Utc>, Vec<f64>>,
    dirty: bool,
}

impl TimeSeriesCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a clean cache from a frame, e.g. one restored from a snapshot.
    pub fn from_frame(frame: &Frame) -> Self {
        let mut cache = Self::new();
        cache.merge(frame);
        cache.dirty = false;
        cache
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether there is a row at exactly `t`.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.rows.contains_key(&t)
    }

    pub fn first_time(&self) -> Option<DateTime<Utc>> {
        self.rows.keys().next().copied()
    }

    pub fn last_time(&self) -> Option<DateTime<Utc>> {
        self.rows.keys().next_back().copied()
    }

    pub fn value(&self, t: DateTime<Utc>, column: &str) -> Option<f64> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(&t).map(|values| values[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, &[f64])> + '_ {
        self.rows.iter().map(|(t, values)| (*t, values.as_slice()))
    }

    /// True when rows were merged or dropped since the last [`mark_clean`](Self::mark_clean).
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Rows with `start <= time <= end`, ordered. Never fetches.
    pub fn get_known(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Frame {
        let mut frame = Frame::new(self.columns.clone());
        if start > end {
            return frame;
        }
        for (t, values) in self.rows.range(start..=end) {
            frame.push(*t, values.clone());
        }
        frame
    }

    /// Everything the cache holds, as one frame.
    pub fn to_frame(&self) -> Frame {
        Frame::from_rows(
            self.columns.clone(),
            self.rows
                .iter()
                .map(|(t, values)| TimeSeriesRow::new(*t, values.clone()))
                .collect(),
        )
    }

    /// Union `frame` into the cache and return the number of rows written.
    ///
    /// Rows whose fields are all unknown are skipped. For a timestamp already
    /// present, each known incoming field replaces the stored one; unknown
    /// incoming fields leave the stored value alone. Merging the same frame
    /// twice is therefore a no-op the second time.
    pub fn merge(&mut self, frame: &Frame) -> usize {
        let mapping: Vec<usize> = frame
            .columns()
            .iter()
            .map(|name| self.column_slot(name))
            .collect();
        let width = self.columns.len();

        let mut written = 0;
        for row in frame.rows() {
            if row.is_all_missing() {
                continue;
            }
            let slot = self
                .rows
                .entry(row.time)
                .or_insert_with(|| vec![f64::NAN; width]);
            for (value, &col) in row.values.iter().zip(&mapping) {
                if !value.is_nan() {
                    slot[col] = *value;
                }
            }
            written += 1;
        }

        if written > 0 {
            self.dirty = true;
        }
        written
    }

    /// Remove rows strictly before `cutoff`. Returns the number removed.
    pub fn drop_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.rows.len();
        self.rows = self.rows.split_off(&cutoff);
        self.note_removed(before)
    }

    /// Remove rows strictly after `cutoff`. Returns the number removed.
    pub fn drop_after(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.rows.len();
        self.rows.retain(|t, _| *t <= cutoff);
        self.note_removed(before)
    }

    fn note_removed(&mut self, before: usize) -> usize {
        let removed = before - self.rows.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    fn column_slot(&mut self, name: &str) -> usize {
        if let Some(idx) = self.columns.iter().position(|c| c == name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for values in self.rows.values_mut() {
            values.push(f64::NAN);
        }
        self.columns.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn q(n: i64) -> DateTime<Utc> {
        t0() + Duration::minutes(15 * n)
    }

    fn prices(values: &[(i64, f64)]) -> Frame {
        let mut frame = Frame::new(["price"]);
        for &(n, v) in values {
            frame.push(q(n), vec![v]);
        }
        frame
    }

    #[test]
    fn get_known_on_empty_cache_is_empty() {
        let cache = TimeSeriesCache::new();
        assert!(cache.get_known(q(0), q(10)).is_empty());
    }

    #[test]
    fn get_known_is_inclusive_and_ordered() {
        let mut cache = TimeSeriesCache::new();
        cache.merge(&prices(&[(3, 3.0), (1, 1.0), (2, 2.0), (4, 4.0)]));

        let frame = cache.get_known(q(1), q(3));
        assert_eq!(frame.times().collect::<Vec<_>>(), vec![q(1), q(2), q(3)]);
    }

    #[test]
    fn get_known_with_inverted_range_is_empty() {
        let mut cache = TimeSeriesCache::new();
        cache.merge(&prices(&[(1, 1.0)]));
        assert!(cache.get_known(q(5), q(0)).is_empty());
    }

    #[test]
    fn merge_overwrites_existing_timestamp() {
        let mut cache = TimeSeriesCache::new();
        cache.merge(&prices(&[(0, 1.0), (1, 2.0)]));
        cache.merge(&prices(&[(1, 9.0)]));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.value(q(1), "price"), Some(9.0));
    }

    #[test]
    fn merge_skips_all_missing_rows() {
        let mut cache = TimeSeriesCache::new();
        let written = cache.merge(&prices(&[(0, f64::NAN), (1, 2.0)]));
        assert_eq!(written, 1);
        assert!(!cache.contains(q(0)));
    }

    #[test]
    fn merge_keeps_stored_value_when_incoming_field_unknown() {
        let mut cache = TimeSeriesCache::new();
        let mut first = Frame::new(["a", "b"]);
        first.push(q(0), vec![1.0, 2.0]);
        cache.merge(&first);

        let mut second = Frame::new(["a", "b"]);
        second.push(q(0), vec![f64::NAN, 5.0]);
        cache.merge(&second);

        assert_eq!(cache.value(q(0), "a"), Some(1.0));
        assert_eq!(cache.value(q(0), "b"), Some(5.0));
    }

    #[test]
    fn merge_adds_new_columns() {
        let mut cache = TimeSeriesCache::new();
        cache.merge(&prices(&[(0, 1.0)]));
        let mut wind = Frame::new(["wind_0"]);
        wind.push(q(1), vec![7.0]);
        cache.merge(&wind);

        assert_eq!(cache.columns(), &["price".to_string(), "wind_0".to_string()]);
        assert!(cache.value(q(0), "wind_0").unwrap().is_nan());
        assert!(cache.value(q(1), "price").unwrap().is_nan());
    }

    #[test]
    fn drop_before_is_strict() {
        let mut cache = TimeSeriesCache::new();
        cache.merge(&prices(&[(0, 0.0), (1, 1.0), (2, 2.0)]));
        cache.mark_clean();

        assert_eq!(cache.drop_before(q(1)), 1);
        assert_eq!(cache.first_time(), Some(q(1)));
        assert!(cache.is_dirty());
    }

    #[test]
    fn drop_after_is_strict() {
        let mut cache = TimeSeriesCache::new();
        cache.merge(&prices(&[(0, 0.0), (1, 1.0), (2, 2.0)]));

        assert_eq!(cache.drop_after(q(1)), 1);
        assert_eq!(cache.last_time(), Some(q(1)));
    }

    #[test]
    fn drop_on_empty_cache_is_noop() {
        let mut cache = TimeSeriesCache::new();
        assert_eq!(cache.drop_before(q(0)), 0);
        assert_eq!(cache.drop_after(q(0)), 0);
        assert!(!cache.is_dirty());
    }

    #[test]
    fn from_frame_starts_clean() {
        let cache = TimeSeriesCache::from_frame(&prices(&[(0, 1.0)]));
        assert!(!cache.is_dirty());
        assert_eq!(cache.len(), 1);
    }
}
