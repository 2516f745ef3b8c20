//! Solar position and sunrise/sunset (NOAA spreadsheet equations).
//!
//! Accurate to well under a degree for the mid-latitudes the regions cover,
//! which is all the calendar features need. Atmospheric refraction is ignored
//! for elevation and folded into the usual 90.833° zenith for sunrise/sunset.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarPosition {
    /// Degrees above the horizon.
    pub elevation: f64,
    /// Degrees clockwise from north.
    pub azimuth: f64,
}

struct SunAngles {
    declination: f64,
    eq_of_time_minutes: f64,
}

fn julian_century(t: DateTime<Utc>) -> f64 {
    let julian_day = t.timestamp() as f64 / 86_400.0 + 2_440_587.5;
    (julian_day - 2_451_545.0) / 36_525.0
}

fn sun_angles(jc: f64) -> SunAngles {
    let mean_long = (280.46646 + jc * (36000.76983 + jc * 0.0003032)).rem_euclid(360.0);
    let mean_anom = 357.52911 + jc * (35999.05029 - 0.0001537 * jc);
    let eccent = 0.016708634 - jc * (0.000042037 + 0.0000001267 * jc);

    let m = mean_anom.to_radians();
    let center = m.sin() * (1.914602 - jc * (0.004817 + 0.000014 * jc))
        + (2.0 * m).sin() * (0.019993 - 0.000101 * jc)
        + (3.0 * m).sin() * 0.000289;
    let true_long = mean_long + center;
    let omega = (125.04 - 1934.136 * jc).to_radians();
    let app_long = true_long - 0.00569 - 0.00478 * omega.sin();

    let mean_obliq =
        23.0 + (26.0 + (21.448 - jc * (46.815 + jc * (0.00059 - jc * 0.001813))) / 60.0) / 60.0;
    let obliq = (mean_obliq + 0.00256 * omega.cos()).to_radians();
    let declination = (obliq.sin() * app_long.to_radians().sin()).asin();

    let y = (obliq / 2.0).tan().powi(2);
    let l0 = mean_long.to_radians();
    let eq_of_time = y * (2.0 * l0).sin() - 2.0 * eccent * m.sin()
        + 4.0 * eccent * y * m.sin() * (2.0 * l0).cos()
        - 0.5 * y * y * (4.0 * l0).sin()
        - 1.25 * eccent * eccent * (2.0 * m).sin();

    SunAngles {
        declination,
        eq_of_time_minutes: 4.0 * eq_of_time.to_degrees(),
    }
}

pub fn solar_position(t: DateTime<Utc>, latitude: f64, longitude: f64) -> SolarPosition {
    let angles = sun_angles(julian_century(t));
    let minutes = t.num_seconds_from_midnight() as f64 / 60.0;
    let true_solar = (minutes + angles.eq_of_time_minutes + 4.0 * longitude).rem_euclid(1440.0);
    let hour_angle = true_solar / 4.0 - 180.0;

    let lat = latitude.to_radians();
    let decl = angles.declination;
    let cos_zenith = (lat.sin() * decl.sin() + lat.cos() * decl.cos() * hour_angle.to_radians().cos())
        .clamp(-1.0, 1.0);
    let zenith = cos_zenith.acos();

    let denom = lat.cos() * zenith.sin();
    let azimuth = if denom.abs() < 1e-12 {
        if hour_angle > 0.0 { 180.0 } else { 0.0 }
    } else {
        let cos_az = ((lat.sin() * zenith.cos() - decl.sin()) / denom).clamp(-1.0, 1.0);
        let az = cos_az.acos().to_degrees();
        if hour_angle > 0.0 {
            (az + 180.0).rem_euclid(360.0)
        } else {
            (540.0 - az).rem_euclid(360.0)
        }
    };

    SolarPosition {
        elevation: 90.0 - zenith.to_degrees(),
        azimuth,
    }
}

/// Sunrise and sunset on `date` (UTC calendar day). `None` during polar day or night.
pub fn sunrise_sunset(
    date: NaiveDate,
    latitude: f64,
    longitude: f64,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let noon = date.and_time(NaiveTime::MIN).and_utc() + Duration::hours(12);
    let angles = sun_angles(julian_century(noon));

    let lat = latitude.to_radians();
    let decl = angles.declination;
    let cos_ha = 90.833_f64.to_radians().cos() / (lat.cos() * decl.cos()) - lat.tan() * decl.tan();
    if !(-1.0..=1.0).contains(&cos_ha) {
        return None;
    }
    let ha_minutes = 4.0 * cos_ha.acos().to_degrees();
    let solar_noon = 720.0 - 4.0 * longitude - angles.eq_of_time_minutes;

    let midnight = date.and_time(NaiveTime::MIN).and_utc();
    let at = |minutes: f64| midnight + Duration::seconds((minutes * 60.0).round() as i64);
    Some((at(solar_noon - ha_minutes), at(solar_noon + ha_minutes)))
}
