//! energy-charts.info day-ahead price provider.
//!
//! `GET /price?bzn=<zone>&start=<iso>&end=<iso>` answers with parallel
//! arrays `unix_seconds` and `price` (EUR/MWh). A body mentioning
//! "no content available" means the zone has nothing for the window yet.

use super::circuit_breaker::CircuitBreaker;
use super::frame::{resolution, Frame};
use super::http;
use super::provider::{FetchError, FetchWindow, Provider};
use super::PRICE_COLUMN;
use chrono::DateTime;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::sync::Arc;

pub const DEFAULT_BASE_URL: &str = "https://api.energy-charts.info";

const NO_CONTENT_MARKER: &str = "no content available";

/// EUR/MWh to ct/kWh.
pub const EUR_PER_MWH_TO_CT_PER_KWH: f64 = 0.1;

#[derive(Debug, Deserialize)]
struct PriceResponse {
    unix_seconds: Vec<i64>,
    price: Vec<Option<f64>>,
}

pub struct EnergyChartsProvider {
    client: Client,
    bidding_zone: String,
    breaker: Arc<CircuitBreaker>,
    base_url: String,
}

impl EnergyChartsProvider {
    pub fn new(client: Client, bidding_zone: impl Into<String>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            client,
            bidding_zone: bidding_zone.into(),
            breaker,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn price_url(&self, window: &FetchWindow) -> String {
        format!(
            "{}/price?bzn={}&start={}&end={}",
            self.base_url,
            self.bidding_zone,
            window.start.format("%Y-%m-%dT%H:%MZ"),
            window.end.format("%Y-%m-%dT%H:%MZ"),
        )
    }
}

/// Parse a price response into ct/kWh on the 15-minute grid.
pub fn parse_prices(body: &str) -> Result<Frame, FetchError> {
    let mut frame = Frame::new([PRICE_COLUMN]);
    if body.to_ascii_lowercase().contains(NO_CONTENT_MARKER) {
        return Ok(frame);
    }

    let resp: PriceResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::ResponseFormatChanged(format!("energy-charts price JSON: {e}")))?;

    if resp.unix_seconds.len() != resp.price.len() {
        return Err(FetchError::ResponseFormatChanged(format!(
            "energy-charts returned {} timestamps but {} prices",
            resp.unix_seconds.len(),
            resp.price.len()
        )));
    }

    for (&ts, price) in resp.unix_seconds.iter().zip(&resp.price) {
        let time = DateTime::from_timestamp(ts, 0).ok_or_else(|| {
            FetchError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
        })?;
        frame.push(time, vec![price.unwrap_or(f64::NAN)]);
    }

    frame.scale_column(PRICE_COLUMN, EUR_PER_MWH_TO_CT_PER_KWH);
    Ok(frame.resample(resolution()))
}

impl Provider for EnergyChartsProvider {
    fn name(&self) -> &str {
        "energy-charts"
    }

    fn fetch(&self, window: &FetchWindow) -> Result<Frame, FetchError> {
        let context = format!("energy-charts {} {window}", self.bidding_zone);
        let body = http::get_text(&self.client, &self.price_url(window), &self.breaker, &context)?;
        Ok(parse_prices(&body)?.clip(window.start, window.end))
    }

    fn is_available(&self) -> bool {
        self.breaker.is_allowed()
    }
}
