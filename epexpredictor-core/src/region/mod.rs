//! Price regions: bidding zone, local timezone, weather sampling
//! coordinates and holiday calendars.

pub mod holidays;

use chrono::{Datelike, NaiveDate, Weekday};
use chrono_tz::Tz;
use holidays::HolidayCalendar;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// The built-in regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionName {
    DE,
    AT,
    BE,
    NL,
}

#[derive(Debug, Error)]
#[error("unknown region '{0}' (expected one of DE, AT, BE, NL)")]
pub struct UnknownRegion(String);

impl RegionName {
    pub const ALL: [RegionName; 4] = [RegionName::DE, RegionName::AT, RegionName::BE, RegionName::NL];

    pub fn as_str(self) -> &'static str {
        match self {
            RegionName::DE => "DE",
            RegionName::AT => "AT",
            RegionName::BE => "BE",
            RegionName::NL => "NL",
        }
    }

    /// Shared definition of this region.
    pub fn region(self) -> Arc<Region> {
        static REGIONS: OnceLock<[Arc<Region>; 4]> = OnceLock::new();
        let all = REGIONS.get_or_init(|| RegionName::ALL.map(|name| Arc::new(Region::builtin(name))));
        Arc::clone(&all[self as usize])
    }
}

impl fmt::Display for RegionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegionName {
    type Err = UnknownRegion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RegionName::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownRegion(s.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub timezone: Tz,
    /// Bidding-zone code as used by energy-charts, e.g. `DE-LU`.
    pub bidding_zone: String,
    /// ENTSO-E EIC area code, when the zone has one.
    pub entsoe_domain: Option<String>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub holidays: Vec<HolidayCalendar>,
}

impl Region {
    /// A region without holiday calendars or ENTSO-E mapping.
    pub fn custom(
        name: impl Into<String>,
        timezone: Tz,
        bidding_zone: impl Into<String>,
        latitudes: Vec<f64>,
        longitudes: Vec<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            timezone,
            bidding_zone: bidding_zone.into(),
            entsoe_domain: None,
            latitudes,
            longitudes,
            holidays: Vec::new(),
        }
    }

    pub fn with_holidays(mut self, holidays: Vec<HolidayCalendar>) -> Self {
        self.holidays = holidays;
        self
    }

    pub fn with_entsoe_domain(mut self, domain: impl Into<String>) -> Self {
        self.entsoe_domain = Some(domain.into());
        self
    }

    fn builtin(name: RegionName) -> Self {
        match name {
            RegionName::DE => Region::custom(
                "DE",
                chrono_tz::Europe::Berlin,
                "DE-LU",
                vec![48.4, 49.7, 51.3, 52.8, 53.8, 54.1],
                vec![9.3, 11.3, 8.6, 12.0, 8.1, 11.6],
            )
            .with_entsoe_domain("10Y1001A1001A82H")
            .with_holidays(holidays::germany()),
            RegionName::AT => Region::custom(
                "AT",
                chrono_tz::Europe::Berlin,
                "AT",
                vec![
                    48.21, 48.27, 48.31, 48.09, 47.68, 48.31, 48.24, 48.03, 47.07, 47.27, 47.56,
                    47.26, 47.07, 46.62, 47.80, 47.81, 47.48, 47.30, 47.08, 46.77, 47.62, 47.08,
                    47.85, 47.31,
                ],
                vec![
                    16.37, 16.17, 15.63, 16.25, 15.44, 14.29, 14.51, 13.93, 15.44, 15.04, 14.29,
                    13.09, 11.40, 14.31, 13.04, 12.88, 13.38, 10.90, 12.68, 13.37, 14.66, 9.67,
                    16.53, 16.38,
                ],
            )
            .with_entsoe_domain("10YAT-APG------L")
            .with_holidays(holidays::austria()),
            // last three points are offshore wind zones
            RegionName::BE => Region::custom(
                "BE",
                chrono_tz::Europe::Berlin,
                "BE",
                vec![
                    51.22, 51.05, 51.21, 50.88, 50.63, 50.41, 50.47, 50.45, 50.85, 51.03, 50.93,
                    49.68, 51.6, 51.4, 51.7,
                ],
                vec![
                    4.40, 3.72, 3.22, 4.70, 5.57, 4.44, 4.87, 3.95, 4.35, 4.48, 5.33, 5.82, 2.8,
                    3.0, 2.5,
                ],
            )
            .with_entsoe_domain("10YBE----------2")
            .with_holidays(holidays::belgium()),
            // last four points are offshore wind zones
            RegionName::NL => Region::custom(
                "NL",
                chrono_tz::Europe::Amsterdam,
                "NL",
                vec![
                    53.22, 53.20, 52.99, 52.37, 52.16, 52.09, 51.99, 52.51, 52.52, 52.42, 51.69,
                    51.44, 51.56, 51.81, 51.99, 51.44, 51.35, 50.85, 52.5, 52.8, 53.0, 53.3,
                ],
                vec![
                    6.57, 5.79, 6.56, 4.90, 4.50, 5.12, 5.89, 6.08, 5.47, 4.62, 4.78, 5.47, 5.09,
                    5.84, 4.14, 3.61, 6.17, 5.69, 3.5, 4.2, 4.5, 4.8,
                ],
            )
            .with_entsoe_domain("10YNL----------L")
            .with_holidays(holidays::netherlands()),
        }
    }

    /// Number of weather sampling points.
    pub fn locations(&self) -> usize {
        self.latitudes.len().min(self.longitudes.len())
    }

    /// Mean of the sampling coordinates, used for solar position.
    pub fn mean_coordinate(&self) -> (f64, f64) {
        let n = self.locations();
        if n == 0 {
            return (0.0, 0.0);
        }
        let lat = self.latitudes[..n].iter().sum::<f64>() / n as f64;
        let lon = self.longitudes[..n].iter().sum::<f64>() / n as f64;
        (lat, lon)
    }

    /// 1.0 on Sundays; otherwise the share of calendars observing `date`.
    pub fn holiday_fraction(&self, date: NaiveDate) -> f64 {
        if date.weekday() == Weekday::Sun {
            return 1.0;
        }
        if self.holidays.is_empty() {
            return 0.0;
        }
        let observing = self.holidays.iter().filter(|c| c.observes(date)).count();
        observing as f64 / self.holidays.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("de".parse::<RegionName>().unwrap(), RegionName::DE);
        assert_eq!(" NL ".parse::<RegionName>().unwrap(), RegionName::NL);
        assert!("FR".parse::<RegionName>().is_err());
    }

    #[test]
    fn builtin_regions_are_shared() {
        let a = RegionName::DE.region();
        let b = RegionName::DE.region();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.bidding_zone, "DE-LU");
        assert_eq!(a.timezone, chrono_tz::Europe::Berlin);
    }

    #[test]
    fn coordinate_lists_line_up() {
        for name in RegionName::ALL {
            let region = name.region();
            assert_eq!(region.latitudes.len(), region.longitudes.len(), "{name}");
            assert!(region.entsoe_domain.is_some());
        }
        assert_eq!(RegionName::AT.region().locations(), 24);
        assert_eq!(RegionName::NL.region().timezone, chrono_tz::Europe::Amsterdam);
    }

    #[test]
    fn holiday_fraction_by_share_of_states() {
        let de = RegionName::DE.region();
        assert_eq!(de.holiday_fraction(d(2025, 12, 25)), 1.0);
        assert_eq!(de.holiday_fraction(d(2025, 1, 6)), 3.0 / 16.0);
        assert_eq!(de.holiday_fraction(d(2025, 1, 7)), 0.0);
        // Sunday
        assert_eq!(de.holiday_fraction(d(2025, 1, 5)), 1.0);
    }

    #[test]
    fn custom_region_without_calendars() {
        let region = Region::custom("T", chrono_tz::UTC, "T", vec![50.0], vec![10.0]);
        assert_eq!(region.holiday_fraction(d(2025, 12, 25)), 0.0);
        assert_eq!(region.mean_coordinate(), (50.0, 10.0));
    }
}
