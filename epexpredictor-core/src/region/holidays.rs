//! Rule-based public-holiday calendars.
//!
//! Each country contributes one calendar per subdivision (German states) or
//! a single national calendar. The `holiday` feature is the share of those
//! calendars observing a date.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use HolidayRule::{Easter, Fixed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolidayRule {
    /// Same month and day every year.
    Fixed { month: u32, day: u32 },
    /// Offset in days from Easter Sunday (Good Friday = -2, Whit Monday = 50).
    Easter(i64),
    /// The last `weekday` strictly before `month`/`day`.
    WeekdayBefore { month: u32, day: u32, weekday: Weekday },
}

impl HolidayRule {
    pub fn date_in(&self, year: i32) -> Option<NaiveDate> {
        match *self {
            HolidayRule::Fixed { month, day } => NaiveDate::from_ymd_opt(year, month, day),
            HolidayRule::Easter(offset) => {
                easter_sunday(year).map(|easter| easter + Duration::days(offset))
            }
            HolidayRule::WeekdayBefore { month, day, weekday } => {
                let anchor = NaiveDate::from_ymd_opt(year, month, day)?;
                let back = (7 + anchor.weekday().num_days_from_monday()
                    - weekday.num_days_from_monday()
                    - 1)
                    % 7
                    + 1;
                Some(anchor - Duration::days(i64::from(back)))
            }
        }
    }
}

/// Western Easter Sunday (anonymous Gregorian algorithm).
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

#[derive(Debug, Clone)]
pub struct HolidayCalendar {
    pub name: String,
    rules: Vec<HolidayRule>,
}

impl HolidayCalendar {
    pub fn new(name: impl Into<String>, rules: Vec<HolidayRule>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }

    pub fn observes(&self, date: NaiveDate) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.date_in(date.year()) == Some(date))
    }
}

const NEW_YEAR: HolidayRule = Fixed { month: 1, day: 1 };
const EPIPHANY: HolidayRule = Fixed { month: 1, day: 6 };
const WOMENS_DAY: HolidayRule = Fixed { month: 3, day: 8 };
const LABOUR_DAY: HolidayRule = Fixed { month: 5, day: 1 };
const ASSUMPTION: HolidayRule = Fixed { month: 8, day: 15 };
const REFORMATION: HolidayRule = Fixed { month: 10, day: 31 };
const ALL_SAINTS: HolidayRule = Fixed { month: 11, day: 1 };
const CHRISTMAS: HolidayRule = Fixed { month: 12, day: 25 };
const BOXING_DAY: HolidayRule = Fixed { month: 12, day: 26 };
const GOOD_FRIDAY: HolidayRule = Easter(-2);
const EASTER_MONDAY: HolidayRule = Easter(1);
const ASCENSION: HolidayRule = Easter(39);
const WHIT_MONDAY: HolidayRule = Easter(50);
const CORPUS_CHRISTI: HolidayRule = Easter(60);
const REPENTANCE_DAY: HolidayRule = HolidayRule::WeekdayBefore {
    month: 11,
    day: 23,
    weekday: Weekday::Wed,
};

const DE_NATIONAL: &[HolidayRule] = &[
    NEW_YEAR,
    GOOD_FRIDAY,
    EASTER_MONDAY,
    LABOUR_DAY,
    ASCENSION,
    WHIT_MONDAY,
    Fixed { month: 10, day: 3 },
    CHRISTMAS,
    BOXING_DAY,
];

const DE_STATES: &[(&str, &[HolidayRule])] = &[
    ("BB", &[REFORMATION]),
    ("BE", &[WOMENS_DAY]),
    ("BW", &[EPIPHANY, CORPUS_CHRISTI, ALL_SAINTS]),
    ("BY", &[EPIPHANY, CORPUS_CHRISTI, ASSUMPTION, ALL_SAINTS]),
    ("HB", &[REFORMATION]),
    ("HE", &[CORPUS_CHRISTI]),
    ("HH", &[REFORMATION]),
    ("MV", &[WOMENS_DAY, REFORMATION]),
    ("NI", &[REFORMATION]),
    ("NW", &[CORPUS_CHRISTI, ALL_SAINTS]),
    ("RP", &[CORPUS_CHRISTI, ALL_SAINTS]),
    ("SH", &[REFORMATION]),
    ("SL", &[CORPUS_CHRISTI, ASSUMPTION, ALL_SAINTS]),
    ("SN", &[REFORMATION, REPENTANCE_DAY]),
    ("ST", &[EPIPHANY, REFORMATION]),
    ("TH", &[Fixed { month: 9, day: 20 }, REFORMATION]),
];

const AT_NATIONAL: &[HolidayRule] = &[
    NEW_YEAR,
    EPIPHANY,
    EASTER_MONDAY,
    LABOUR_DAY,
    ASCENSION,
    WHIT_MONDAY,
    CORPUS_CHRISTI,
    ASSUMPTION,
    Fixed { month: 10, day: 26 },
    ALL_SAINTS,
    Fixed { month: 12, day: 8 },
    CHRISTMAS,
    BOXING_DAY,
];

const BE_NATIONAL: &[HolidayRule] = &[
    NEW_YEAR,
    EASTER_MONDAY,
    LABOUR_DAY,
    ASCENSION,
    WHIT_MONDAY,
    Fixed { month: 7, day: 21 },
    ASSUMPTION,
    ALL_SAINTS,
    Fixed { month: 11, day: 11 },
    CHRISTMAS,
];

const NL_NATIONAL: &[HolidayRule] = &[
    NEW_YEAR,
    EASTER_MONDAY,
    Fixed { month: 4, day: 27 },
    Fixed { month: 5, day: 5 },
    ASCENSION,
    WHIT_MONDAY,
    CHRISTMAS,
    BOXING_DAY,
];

/// One calendar per German state.
pub fn germany() -> Vec<HolidayCalendar> {
    DE_STATES
        .iter()
        .map(|(state, extra)| {
            let rules = DE_NATIONAL.iter().chain(extra.iter()).copied().collect();
            HolidayCalendar::new(format!("DE-{state}"), rules)
        })
        .collect()
}

pub fn austria() -> Vec<HolidayCalendar> {
    vec![HolidayCalendar::new("AT", AT_NATIONAL.to_vec())]
}

pub fn belgium() -> Vec<HolidayCalendar> {
    vec![HolidayCalendar::new("BE", BE_NATIONAL.to_vec())]
}

pub fn netherlands() -> Vec<HolidayCalendar> {
    vec![HolidayCalendar::new("NL", NL_NATIONAL.to_vec())]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn easter_dates() {
        assert_eq!(easter_sunday(2024), Some(d(2024, 3, 31)));
        assert_eq!(easter_sunday(2025), Some(d(2025, 4, 20)));
        assert_eq!(easter_sunday(2026), Some(d(2026, 4, 5)));
    }

    #[test]
    fn movable_feasts_follow_easter() {
        assert_eq!(GOOD_FRIDAY.date_in(2025), Some(d(2025, 4, 18)));
        assert_eq!(WHIT_MONDAY.date_in(2025), Some(d(2025, 6, 9)));
        assert_eq!(CORPUS_CHRISTI.date_in(2025), Some(d(2025, 6, 19)));
    }

    #[test]
    fn repentance_day_is_wednesday_before_nov_23() {
        assert_eq!(REPENTANCE_DAY.date_in(2025), Some(d(2025, 11, 19)));
        // Nov 23 2022 was itself a Wednesday
        assert_eq!(REPENTANCE_DAY.date_in(2022), Some(d(2022, 11, 16)));
    }

    #[test]
    fn germany_has_sixteen_state_calendars() {
        let states = germany();
        assert_eq!(states.len(), 16);
        let epiphany = states.iter().filter(|c| c.observes(d(2025, 1, 6))).count();
        assert_eq!(epiphany, 3);
        assert!(states.iter().all(|c| c.observes(d(2025, 12, 25))));
    }

    #[test]
    fn ordinary_day_is_not_a_holiday() {
        assert!(!netherlands()[0].observes(d(2025, 3, 12)));
        assert!(netherlands()[0].observes(d(2025, 4, 27)));
    }
}
