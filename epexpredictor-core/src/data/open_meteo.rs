//! Open-Meteo weather provider.
//!
//! One request covers every sampling coordinate of the region. Windows
//! reaching further back than the forecast API keeps go to the
//! historical-forecast host instead.

use super::circuit_breaker::CircuitBreaker;
use super::frame::{resolution, Frame};
use super::http;
use super::planner::{local_day, probe_instant};
use super::provider::{FetchError, FetchWindow, Provider};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use chrono_tz::Tz;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const FORECAST_HOST: &str = "api.open-meteo.com";
pub const HISTORY_HOST: &str = "historical-forecast-api.open-meteo.com";

/// How far back the forecast API serves data.
pub const FORECAST_HISTORY_DAYS: i64 = 60;

const VARIABLES: &str = "wind_speed_80m,temperature_2m,global_tilted_irradiance";

/// Column names for sampling point `i`, in frame order.
pub fn location_columns(i: usize) -> [String; 3] {
    [format!("wind_{i}"), format!("temp_{i}"), format!("irradiance_{i}")]
}

/// Instant before which windows must use the historical host.
pub fn history_switch(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(FORECAST_HISTORY_DAYS)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Forecasts {
    Many(Vec<LocationForecast>),
    One(LocationForecast),
}

#[derive(Debug, Deserialize)]
struct LocationForecast {
    #[serde(default)]
    error: bool,
    reason: Option<String>,
    minutely_15: Option<Minutely15>,
}

#[derive(Debug, Deserialize)]
struct Minutely15 {
    time: Vec<String>,
    wind_speed_80m: Vec<Option<f64>>,
    temperature_2m: Vec<Option<f64>>,
    global_tilted_irradiance: Vec<Option<f64>>,
}

pub struct OpenMeteoProvider {
    client: Client,
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    timezone: Tz,
    breaker: Arc<CircuitBreaker>,
}

impl OpenMeteoProvider {
    pub fn new(
        client: Client,
        latitudes: Vec<f64>,
        longitudes: Vec<f64>,
        timezone: Tz,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            client,
            latitudes,
            longitudes,
            timezone,
            breaker,
        }
    }

    fn join(values: &[f64]) -> String {
        values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// The host follows the window's first local day, judged at its noon,
    /// the same instant the gap planner splits on.
    fn forecast_url(&self, window: &FetchWindow, now: DateTime<Utc>) -> String {
        let first_noon = probe_instant(local_day(window.start, self.timezone), self.timezone);
        let host = if first_noon < history_switch(now) {
            HISTORY_HOST
        } else {
            FORECAST_HOST
        };
        let first_day = window.start.date_naive();
        let last_day = (window.end - Duration::seconds(1)).date_naive();
        format!(
            "https://{host}/v1/forecast?latitude={}&longitude={}&azimuth=0&tilt=0\
             &start_date={first_day}&end_date={last_day}&minutely_15={VARIABLES}&timezone=UTC",
            Self::join(&self.latitudes),
            Self::join(&self.longitudes),
        )
    }
}

fn value_at(values: &[Option<f64>], row: usize) -> f64 {
    values.get(row).copied().flatten().unwrap_or(f64::NAN)
}

/// Parse a (single- or multi-location) response into one frame with three
/// columns per location.
pub fn parse_forecasts(body: &str) -> Result<Frame, FetchError> {
    let parsed: Forecasts = serde_json::from_str(body)
        .map_err(|e| FetchError::ResponseFormatChanged(format!("Open-Meteo JSON: {e}")))?;
    let locations = match parsed {
        Forecasts::Many(all) => all,
        Forecasts::One(one) => vec![one],
    };

    let width = locations.len() * 3;
    let mut columns = Vec::with_capacity(width);
    let mut table: BTreeMap<DateTime<Utc>, Vec<f64>> = BTreeMap::new();

    for (i, location) in locations.into_iter().enumerate() {
        if location.error {
            return Err(FetchError::ResponseFormatChanged(format!(
                "Open-Meteo error: {}",
                location.reason.unwrap_or_default()
            )));
        }
        columns.extend(location_columns(i));
        let Some(series) = location.minutely_15 else {
            continue;
        };

        for (row, raw) in series.time.iter().enumerate() {
            let time = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
                .map_err(|e| {
                    FetchError::ResponseFormatChanged(format!("Open-Meteo time '{raw}': {e}"))
                })?
                .and_utc();
            let slot = table.entry(time).or_insert_with(|| vec![f64::NAN; width]);
            slot[i * 3] = value_at(&series.wind_speed_80m, row);
            slot[i * 3 + 1] = value_at(&series.temperature_2m, row);
            slot[i * 3 + 2] = value_at(&series.global_tilted_irradiance, row);
        }
    }

    let mut frame = Frame::new(columns);
    for (time, values) in table {
        frame.push(time, values);
    }
    Ok(frame.resample(resolution()))
}

impl Provider for OpenMeteoProvider {
    fn name(&self) -> &str {
        "open-meteo"
    }

    fn fetch(&self, window: &FetchWindow) -> Result<Frame, FetchError> {
        let context = format!("Open-Meteo {window}");
        let url = self.forecast_url(window, Utc::now());
        let body = http::get_text(&self.client, &url, &self.breaker, &context)?;
        Ok(parse_forecasts(&body)?.clip(window.start, window.end))
    }

    fn is_available(&self) -> bool {
        self.breaker.is_allowed()
    }
}
