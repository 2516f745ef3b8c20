//! Weather store backed by Open-Meteo.
//!
//! Gaps never straddle the point where the forecast API stops serving
//! history, so each request goes to exactly one host.

use super::{DataStore, StoreCore, StoreKind};
use crate::config::BreakerConfig;
use crate::data::fallback::{FallbackOrchestrator, RetryPolicy};
use crate::data::open_meteo::{history_switch, OpenMeteoProvider};
use crate::data::planner::PlannerConstraints;
use crate::region::Region;
use crate::schedule::{FixedInterval, RevalidationPolicy};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use std::path::Path;
use std::sync::Arc;

pub const WEATHER_MAX_SPAN_DAYS: u32 = 90;

pub struct WeatherStore {
    core: StoreCore,
    orchestrator: FallbackOrchestrator,
    max_span_days: u32,
    schedule: FixedInterval,
}

impl WeatherStore {
    pub fn new(
        region: Arc<Region>,
        storage_dir: Option<&Path>,
        orchestrator: FallbackOrchestrator,
        schedule: FixedInterval,
    ) -> Self {
        Self {
            core: StoreCore::new(StoreKind::Weather, region, storage_dir),
            orchestrator,
            max_span_days: WEATHER_MAX_SPAN_DAYS,
            schedule,
        }
    }

    pub fn with_http(
        region: Arc<Region>,
        storage_dir: Option<&Path>,
        client: Client,
        retry: RetryPolicy,
        breakers: &BreakerConfig,
        schedule: FixedInterval,
    ) -> Self {
        let label = format!("{}/{}", region.bidding_zone, StoreKind::Weather);
        let provider = OpenMeteoProvider::new(
            client,
            region.latitudes.clone(),
            region.longitudes.clone(),
            region.timezone,
            Arc::new(breakers.build()),
        );
        let orchestrator = FallbackOrchestrator::new(label).with_provider(Arc::new(provider), retry);
        Self::new(region, storage_dir, orchestrator, schedule)
    }

    pub fn with_max_span_days(mut self, days: u32) -> Self {
        self.max_span_days = days;
        self
    }

    fn constraints(&self, now: DateTime<Utc>) -> PlannerConstraints {
        PlannerConstraints::max_span(self.max_span_days).with_switch_at(history_switch(now))
    }

    /// Refetch `[start, end]` even where it is cached; forecasts get revised.
    pub fn refresh_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.core
            .refetch(start, end, &self.constraints(Utc::now()), &self.orchestrator)
    }
}

impl DataStore for WeatherStore {
    fn core(&self) -> &StoreCore {
        &self.core
    }

    fn fetch_missing_data(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.core
            .fetch_missing(start, end, &self.constraints(Utc::now()), &self.orchestrator)
    }

    fn next_revalidation_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let cache = self.core.read();
        self.schedule
            .next_revalidation_time(&cache, self.core.region(), now)
    }
}
