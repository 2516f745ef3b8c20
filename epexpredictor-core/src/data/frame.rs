//! Time-indexed row batches.
//!
//! A [`Frame`] is what providers hand to the cache and what the cache hands
//! back to consumers: a column list plus rows keyed by UTC instant. `NaN`
//! marks a single unknown field.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical sampling interval of every store, in minutes.
pub const RESOLUTION_MINUTES: i64 = 15;

/// Canonical sampling interval of every store.
pub fn resolution() -> Duration {
    Duration::minutes(RESOLUTION_MINUTES)
}

/// Round `t` down to a multiple of `step` since the Unix epoch.
pub fn align_down(t: DateTime<Utc>, step: Duration) -> DateTime<Utc> {
    let secs = step.num_seconds();
    if secs <= 0 {
        return t;
    }
    let ts = t.timestamp();
    DateTime::from_timestamp(ts - ts.rem_euclid(secs), 0).unwrap_or(t)
}

/// One instant plus its field values, positionally matching a column list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesRow {
    pub time: DateTime<Utc>,
    pub values: Vec<f64>,
}

impl TimeSeriesRow {
    pub fn new(time: DateTime<Utc>, values: Vec<f64>) -> Self {
        Self { time, values }
    }

    /// True when every field is unknown.
    pub fn is_all_missing(&self) -> bool {
        self.values.iter().all(|v| v.is_nan())
    }
}

/// A batch of rows sharing one column list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<TimeSeriesRow>,
}

impl Frame {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<TimeSeriesRow>) -> Self {
        let mut frame = Self { columns, rows: Vec::with_capacity(rows.len()) };
        for row in rows {
            frame.push(row.time, row.values);
        }
        frame
    }

    /// Append a row. Short value lists are padded with `NaN`, long ones truncated.
    pub fn push(&mut self, time: DateTime<Utc>, mut values: Vec<f64>) {
        values.resize(self.columns.len(), f64::NAN);
        self.rows.push(TimeSeriesRow { time, values });
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[TimeSeriesRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<TimeSeriesRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn times(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.rows.iter().map(|r| r.time)
    }

    pub fn first_time(&self) -> Option<DateTime<Utc>> {
        self.rows.first().map(|r| r.time)
    }

    pub fn last_time(&self) -> Option<DateTime<Utc>> {
        self.rows.last().map(|r| r.time)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r.values[idx]).collect())
    }

    /// Value of `name` at `time`. Requires the frame to be sorted.
    pub fn value_at(&self, time: DateTime<Utc>, name: &str) -> Option<f64> {
        let idx = self.column_index(name)?;
        let pos = self.rows.binary_search_by_key(&time, |r| r.time).ok()?;
        Some(self.rows[pos].values[idx])
    }

    /// Sort by time and keep only the last row for each timestamp.
    pub fn sort_dedup(&mut self) {
        self.rows.sort_by_key(|r| r.time);
        let mut deduped: Vec<TimeSeriesRow> = Vec::with_capacity(self.rows.len());
        for row in self.rows.drain(..) {
            match deduped.last_mut() {
                Some(last) if last.time == row.time => *last = row,
                _ => deduped.push(row),
            }
        }
        self.rows = deduped;
    }

    /// Keep rows with `start <= time < end`.
    pub fn clip(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.rows.retain(|r| r.time >= start && r.time < end);
        self
    }

    /// Multiply one column in place. Unknown columns are ignored.
    pub fn scale_column(&mut self, name: &str, factor: f64) {
        if let Some(idx) = self.column_index(name) {
            for row in &mut self.rows {
                row.values[idx] *= factor;
            }
        }
    }

    /// Resample onto a regular `step` grid, forward-filling then back-filling.
    ///
    /// The grid starts at the first sample rounded down to `step` and extends
    /// past the last sample by one native interval (the smallest spacing seen
    /// in the input), so hourly data yields four quarter-hours for its final
    /// hour but the grid never reaches into time the source did not cover.
    pub fn resample(&self, step: Duration) -> Frame {
        let mut sorted = self.clone();
        sorted.sort_dedup();

        let (first, last) = match (sorted.first_time(), sorted.last_time()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Frame::new(self.columns.clone()),
        };

        let native = sorted
            .rows
            .windows(2)
            .map(|w| w[1].time - w[0].time)
            .min()
            .unwrap_or(step);
        let grid_start = align_down(first, step);
        let grid_end = last + (native - step).max(Duration::zero());

        let width = self.columns.len();
        let mut carried = vec![f64::NAN; width];
        let mut source = sorted.rows.iter().peekable();
        let mut out = Vec::new();

        let mut t = grid_start;
        while t <= grid_end {
            while let Some(row) = source.next_if(|row| row.time <= t) {
                for (slot, value) in carried.iter_mut().zip(&row.values) {
                    if !value.is_nan() {
                        *slot = *value;
                    }
                }
            }
            out.push(TimeSeriesRow::new(t, carried.clone()));
            t += step;
        }

        let mut next_known = vec![f64::NAN; width];
        for row in out.iter_mut().rev() {
            for (value, next) in row.values.iter_mut().zip(next_known.iter_mut()) {
                if value.is_nan() {
                    *value = *next;
                } else {
                    *next = *value;
                }
            }
        }

        Frame {
            columns: self.columns.clone(),
            rows: out,
        }
    }

    /// Outer-join frames on time. Columns are the ordered union; where two
    /// frames carry the same column, the later frame's known values win.
    pub fn outer_join(frames: &[&Frame]) -> Frame {
        let mut columns: Vec<String> = Vec::new();
        let mappings: Vec<Vec<usize>> = frames
            .iter()
            .map(|frame| {
                frame
                    .columns
                    .iter()
                    .map(|name| match columns.iter().position(|c| c == name) {
                        Some(idx) => idx,
                        None => {
                            columns.push(name.clone());
                            columns.len() - 1
                        }
                    })
                    .collect()
            })
            .collect();

        let width = columns.len();
        let mut table: BTreeMap<DateTime<Utc>, Vec<f64>> = BTreeMap::new();
        for (frame, mapping) in frames.iter().zip(&mappings) {
            for row in &frame.rows {
                let slot = table
                    .entry(row.time)
                    .or_insert_with(|| vec![f64::NAN; width]);
                for (value, &col) in row.values.iter().zip(mapping) {
                    if !value.is_nan() {
                        slot[col] = *value;
                    }
                }
            }
        }

        Frame {
            columns,
            rows: table
                .into_iter()
                .map(|(time, values)| TimeSeriesRow { time, values })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, h, m, 0).unwrap()
    }

    #[test]
    fn align_down_snaps_to_quarter_hours() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 10, 44, 59).unwrap();
        assert_eq!(align_down(t, resolution()), at(10, 30));
        assert_eq!(align_down(at(10, 30), resolution()), at(10, 30));
    }

    #[test]
    fn push_pads_short_rows() {
        let mut frame = Frame::new(["a", "b"]);
        frame.push(at(0, 0), vec![1.0]);
        assert_eq!(frame.rows()[0].values.len(), 2);
        assert!(frame.rows()[0].values[1].is_nan());
    }

    #[test]
    fn sort_dedup_keeps_last_write() {
        let mut frame = Frame::new(["price"]);
        frame.push(at(1, 0), vec![2.0]);
        frame.push(at(0, 0), vec![1.0]);
        frame.push(at(1, 0), vec![3.0]);
        frame.sort_dedup();

        assert_eq!(frame.len(), 2);
        assert_eq!(frame.value_at(at(1, 0), "price"), Some(3.0));
    }

    #[test]
    fn resample_hourly_fills_final_hour() {
        let mut frame = Frame::new(["price"]);
        frame.push(at(0, 0), vec![10.0]);
        frame.push(at(1, 0), vec![20.0]);

        let resampled = frame.resample(resolution());
        assert_eq!(resampled.len(), 8);
        assert_eq!(resampled.value_at(at(0, 45), "price"), Some(10.0));
        assert_eq!(resampled.value_at(at(1, 45), "price"), Some(20.0));
    }

    #[test]
    fn resample_patches_holes_forward_then_backward() {
        let mut frame = Frame::new(["a", "b"]);
        frame.push(at(0, 0), vec![1.0, f64::NAN]);
        frame.push(at(0, 15), vec![f64::NAN, 5.0]);
        frame.push(at(0, 45), vec![3.0, 6.0]);

        let resampled = frame.resample(resolution());
        assert_eq!(resampled.len(), 4);
        // 00:30 missing entirely -> forward-filled
        assert_eq!(resampled.value_at(at(0, 30), "a"), Some(1.0));
        assert_eq!(resampled.value_at(at(0, 30), "b"), Some(5.0));
        // leading NaN in b -> back-filled
        assert_eq!(resampled.value_at(at(0, 0), "b"), Some(5.0));
    }

    #[test]
    fn resample_empty_frame_keeps_columns() {
        let frame = Frame::new(["price"]);
        let resampled = frame.resample(resolution());
        assert!(resampled.is_empty());
        assert_eq!(resampled.columns(), &["price".to_string()]);
    }

    #[test]
    fn clip_is_half_open() {
        let mut frame = Frame::new(["x"]);
        for h in 0..4 {
            frame.push(at(h, 0), vec![h as f64]);
        }
        let clipped = frame.clip(at(1, 0), at(3, 0));
        assert_eq!(clipped.times().collect::<Vec<_>>(), vec![at(1, 0), at(2, 0)]);
    }

    #[test]
    fn outer_join_unions_columns_and_times() {
        let mut weather = Frame::new(["wind_0"]);
        weather.push(at(0, 0), vec![4.0]);
        weather.push(at(0, 15), vec![5.0]);
        let mut prices = Frame::new(["price"]);
        prices.push(at(0, 15), vec![9.0]);
        prices.push(at(0, 30), vec![8.0]);

        let joined = Frame::outer_join(&[&weather, &prices]);
        assert_eq!(joined.columns(), &["wind_0".to_string(), "price".to_string()]);
        assert_eq!(joined.len(), 3);
        assert!(joined.value_at(at(0, 0), "price").unwrap().is_nan());
        assert_eq!(joined.value_at(at(0, 15), "price"), Some(9.0));
        assert!(joined.value_at(at(0, 30), "wind_0").unwrap().is_nan());
    }
}
