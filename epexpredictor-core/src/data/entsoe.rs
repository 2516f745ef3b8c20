//! ENTSO-E transparency platform day-ahead price provider (fallback).
//!
//! Needs a security token; without one the provider reports itself
//! unavailable and the chain skips it. Answers are
//! `Publication_MarketDocument` XML with one or more `Period` blocks; an
//! `Acknowledgement_MarketDocument` means no data for the window.

use super::circuit_breaker::CircuitBreaker;
use super::energy_charts::EUR_PER_MWH_TO_CT_PER_KWH;
use super::frame::{resolution, Frame};
use super::http;
use super::provider::{FetchError, FetchWindow, Provider};
use super::PRICE_COLUMN;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use reqwest::blocking::Client;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DEFAULT_BASE_URL: &str = "https://web-api.tp.entsoe.eu/api";

pub struct EntsoeProvider {
    client: Client,
    domain: Option<String>,
    api_key: Option<String>,
    breaker: Arc<CircuitBreaker>,
    base_url: String,
}

impl EntsoeProvider {
    pub fn new(
        client: Client,
        domain: Option<String>,
        api_key: Option<String>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            client,
            domain,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            breaker,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The query is one day wider on each side; the result is clipped afterwards.
    fn day_ahead_url(&self, domain: &str, api_key: &str, window: &FetchWindow) -> String {
        let start = window.start - Duration::days(1);
        let end = window.end + Duration::days(1);
        format!(
            "{}?securityToken={api_key}&documentType=A44&in_Domain={domain}&out_Domain={domain}\
             &periodStart={}&periodEnd={}",
            self.base_url,
            start.format("%Y%m%d%H%M"),
            end.format("%Y%m%d%H%M"),
        )
    }
}

// ── XML scanning ────────────────────────────────────────────────────
//
// The day-ahead document is flat and attribute-free where it matters, so a
// tag scanner is enough.

fn sections<'a>(text: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(&open) {
        let body = &rest[start + open.len()..];
        match body.find(&close) {
            Some(end) => {
                out.push(&body[..end]);
                rest = &body[end + close.len()..];
            }
            None => break,
        }
    }
    out
}

fn first_tag<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    sections(text, tag).into_iter().next().map(str::trim)
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, FetchError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%MZ")
        .map(|t| t.and_utc())
        .map_err(|e| FetchError::ResponseFormatChanged(format!("ENTSO-E timestamp '{raw}': {e}")))
}

fn parse_resolution(raw: &str) -> Result<Duration, FetchError> {
    match raw {
        "PT15M" => Ok(Duration::minutes(15)),
        "PT30M" => Ok(Duration::minutes(30)),
        "PT60M" | "PT1H" => Ok(Duration::hours(1)),
        other => Err(FetchError::ResponseFormatChanged(format!(
            "unsupported ENTSO-E resolution '{other}'"
        ))),
    }
}

fn missing(what: &str) -> FetchError {
    FetchError::ResponseFormatChanged(format!("ENTSO-E document without {what}"))
}

/// Parse a day-ahead document into ct/kWh on the 15-minute grid.
pub fn parse_day_ahead(body: &str) -> Result<Frame, FetchError> {
    let mut frame = Frame::new([PRICE_COLUMN]);
    if body.contains("Acknowledgement_MarketDocument") {
        return Ok(frame);
    }
    if !body.contains("Publication_MarketDocument") {
        return Err(FetchError::ResponseFormatChanged(
            "expected a Publication_MarketDocument".into(),
        ));
    }

    for period in sections(body, "Period") {
        let start = parse_instant(first_tag(period, "start").ok_or_else(|| missing("period start"))?)?;
        let step = parse_resolution(first_tag(period, "resolution").ok_or_else(|| missing("resolution"))?)?;

        let mut prices = BTreeMap::new();
        for point in sections(period, "Point") {
            let position: i64 = first_tag(point, "position")
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| missing("point position"))?;
            let price: f64 = first_tag(point, "price.amount")
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| missing("price.amount"))?;
            prices.insert(position, price);
        }

        // A03 curves omit points whose price repeats the previous one;
        // the period's end says how many positions there are.
        let last_listed = prices.keys().next_back().copied().unwrap_or(0);
        let slots = match first_tag(period, "end") {
            Some(end) => ((parse_instant(end)? - start).num_seconds() / step.num_seconds()).max(last_listed),
            None => last_listed,
        };

        let mut current = None;
        for position in 1..=slots {
            if let Some(&price) = prices.get(&position) {
                current = Some(price);
            }
            if let Some(price) = current {
                frame.push(start + step * (position - 1) as i32, vec![price]);
            }
        }
    }

    frame.scale_column(PRICE_COLUMN, EUR_PER_MWH_TO_CT_PER_KWH);
    Ok(frame.resample(resolution()))
}

impl Provider for EntsoeProvider {
    fn name(&self) -> &str {
        "entsoe"
    }

    fn fetch(&self, window: &FetchWindow) -> Result<Frame, FetchError> {
        let (Some(domain), Some(api_key)) = (&self.domain, &self.api_key) else {
            return Err(FetchError::NotConfigured("ENTSO-E API key or area code missing".into()));
        };
        let context = format!("ENTSO-E {domain} {window}");
        let url = self.day_ahead_url(domain, api_key, window);
        let body = http::get_text(&self.client, &url, &self.breaker, &context)?;
        Ok(parse_day_ahead(&body)?.clip(window.start, window.end))
    }

    fn is_available(&self) -> bool {
        self.domain.is_some() && self.api_key.is_some() && self.breaker.is_allowed()
    }
}
