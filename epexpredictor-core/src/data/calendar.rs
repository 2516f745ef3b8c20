//! Locally computed calendar and solar features.
//!
//! Every 15-minute slot gets, in the region's local time: the holiday share,
//! a weekday one-hot (`day_0` = Monday … `day_5` = Saturday, Sunday all
//! zero), a time-of-day one-hot `i_<hour>_<minute>`, sun elevation and
//! azimuth at the region's mean coordinate, and the distance to sunrise and
//! sunset in minutes, capped at three hours.

use super::frame::{resolution, Frame, TimeSeriesRow};
use super::provider::{FetchError, FetchWindow, Provider};
use super::solar::{solar_position, sunrise_sunset};
use crate::region::Region;
use chrono::{DateTime, Datelike, Timelike, Utc};
use rayon::prelude::*;
use std::sync::Arc;

pub const HOLIDAY_COLUMN: &str = "holiday";
pub const SUN_ELEVATION_COLUMN: &str = "sunelevation";
pub const AZIMUTH_COLUMN: &str = "azimuth";
pub const SUNRISE_INFLUENCE_COLUMN: &str = "sr_influence";
pub const SUNSET_INFLUENCE_COLUMN: &str = "ss_influence";

/// Cap on sunrise/sunset distance.
pub const INFLUENCE_CAP_MINUTES: f64 = 180.0;

const WEEKDAY_COLUMNS: usize = 6;
const SLOTS_PER_DAY: usize = 96;

/// Column order of every calendar frame.
pub fn feature_columns() -> Vec<String> {
    let mut columns = Vec::with_capacity(1 + WEEKDAY_COLUMNS + SLOTS_PER_DAY + 4);
    columns.push(HOLIDAY_COLUMN.to_string());
    columns.extend((0..WEEKDAY_COLUMNS).map(|i| format!("day_{i}")));
    for hour in 0..24 {
        for minute in [0, 15, 30, 45] {
            columns.push(format!("i_{hour}_{minute}"));
        }
    }
    columns.extend(
        [
            SUN_ELEVATION_COLUMN,
            AZIMUTH_COLUMN,
            SUNRISE_INFLUENCE_COLUMN,
            SUNSET_INFLUENCE_COLUMN,
        ]
        .map(String::from),
    );
    columns
}

pub struct CalendarFeatures {
    region: Arc<Region>,
    columns: Vec<String>,
}

impl CalendarFeatures {
    pub fn new(region: Arc<Region>) -> Self {
        Self {
            region,
            columns: feature_columns(),
        }
    }

    pub fn features_at(&self, t: DateTime<Utc>) -> Vec<f64> {
        let local = t.with_timezone(&self.region.timezone);
        let date = local.date_naive();
        let (lat, lon) = self.region.mean_coordinate();

        let mut values = vec![0.0; self.columns.len()];
        values[0] = self.region.holiday_fraction(date);

        let weekday = local.weekday().num_days_from_monday() as usize;
        if weekday < WEEKDAY_COLUMNS {
            values[1 + weekday] = 1.0;
        }

        let slot = local.hour() as usize * 4 + local.minute() as usize / 15;
        values[1 + WEEKDAY_COLUMNS + slot.min(SLOTS_PER_DAY - 1)] = 1.0;

        let solar_base = 1 + WEEKDAY_COLUMNS + SLOTS_PER_DAY;
        let position = solar_position(t, lat, lon);
        values[solar_base] = position.elevation;
        values[solar_base + 1] = position.azimuth;

        let (sunrise, sunset) = match sunrise_sunset(date, lat, lon) {
            Some((rise, set)) => (influence(t, rise), influence(t, set)),
            None => (INFLUENCE_CAP_MINUTES, INFLUENCE_CAP_MINUTES),
        };
        values[solar_base + 2] = sunrise;
        values[solar_base + 3] = sunset;

        values
    }
}

fn influence(t: DateTime<Utc>, event: DateTime<Utc>) -> f64 {
    ((t - event).num_minutes().abs() as f64).min(INFLUENCE_CAP_MINUTES)
}

impl Provider for CalendarFeatures {
    fn name(&self) -> &str {
        "calendar"
    }

    fn fetch(&self, window: &FetchWindow) -> Result<Frame, FetchError> {
        let mut slots = Vec::new();
        let mut t = window.start;
        while t < window.end {
            slots.push(t);
            t += resolution();
        }

        let rows: Vec<TimeSeriesRow> = slots
            .par_iter()
            .map(|&t| TimeSeriesRow::new(t, self.features_at(t)))
            .collect();

        Ok(Frame::from_rows(self.columns.clone(), rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionName;
    use chrono::{Duration, TimeZone};

    fn provider() -> CalendarFeatures {
        CalendarFeatures::new(RegionName::DE.region())
    }

    fn day_window() -> FetchWindow {
        // 2025-11-01 00:00 Berlin (CET)
        let start = Utc.with_ymd_and_hms(2025, 10, 31, 23, 0, 0).unwrap();
        FetchWindow::new(start, start + Duration::days(1))
    }

    #[test]
    fn columns_are_stable() {
        let columns = feature_columns();
        assert_eq!(columns.len(), 1 + 6 + 96 + 4);
        assert_eq!(columns[0], "holiday");
        assert!(columns.contains(&"i_0_0".to_string()));
        assert!(columns.contains(&"i_23_45".to_string()));
    }

    #[test]
    fn one_day_yields_96_rows_with_one_slot_each() {
        let frame = provider().fetch(&day_window()).unwrap();
        assert_eq!(frame.len(), 96);

        let slot_range = 7..7 + 96;
        for row in frame.rows() {
            let active: f64 = row.values[slot_range.clone()].iter().sum();
            assert_eq!(active, 1.0);
        }
    }

    #[test]
    fn local_midnight_maps_to_first_slot() {
        let frame = provider().fetch(&day_window()).unwrap();
        let first = frame.first_time().unwrap();
        assert_eq!(frame.value_at(first, "i_0_0"), Some(1.0));
        // All Saints, observed by five of sixteen states; a Saturday
        assert_eq!(frame.value_at(first, "holiday"), Some(5.0 / 16.0));
        assert_eq!(frame.value_at(first, "day_5"), Some(1.0));
    }

    #[test]
    fn influence_is_capped() {
        let frame = provider().fetch(&day_window()).unwrap();
        for name in [SUNRISE_INFLUENCE_COLUMN, SUNSET_INFLUENCE_COLUMN] {
            let values = frame.column(name).unwrap();
            assert!(values.iter().all(|v| (0.0..=INFLUENCE_CAP_MINUTES).contains(v)));
        }
        let noon = Utc.with_ymd_and_hms(2025, 11, 1, 11, 0, 0).unwrap();
        assert_eq!(frame.value_at(noon, SUNRISE_INFLUENCE_COLUMN), Some(INFLUENCE_CAP_MINUTES));
    }

    #[test]
    fn sunday_is_a_full_holiday_with_no_weekday_flag() {
        let sunday = Utc.with_ymd_and_hms(2025, 11, 2, 12, 0, 0).unwrap();
        let values = provider().features_at(sunday);
        assert_eq!(values[0], 1.0);
        assert!(values[1..7].iter().all(|v| *v == 0.0));
    }
}
