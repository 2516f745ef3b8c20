//! Day-ahead price store.

use super::{DataStore, StoreCore, StoreKind};
use crate::config::BreakerConfig;
use crate::data::energy_charts::EnergyChartsProvider;
use crate::data::entsoe::EntsoeProvider;
use crate::data::fallback::{FallbackOrchestrator, RetryPolicy};
use crate::data::planner::PlannerConstraints;
use crate::region::Region;
use crate::schedule::{PublicationSchedule, RevalidationPolicy};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Upper bound on days per upstream request.
pub const PRICE_MAX_SPAN_DAYS: u32 = 90;

pub struct PriceStore {
    core: StoreCore,
    orchestrator: FallbackOrchestrator,
    constraints: PlannerConstraints,
    schedule: PublicationSchedule,
}

impl PriceStore {
    pub fn new(
        region: Arc<Region>,
        storage_dir: Option<&Path>,
        orchestrator: FallbackOrchestrator,
        schedule: PublicationSchedule,
    ) -> Self {
        Self {
            core: StoreCore::new(StoreKind::Price, region, storage_dir),
            orchestrator,
            constraints: PlannerConstraints::max_span(PRICE_MAX_SPAN_DAYS),
            schedule,
        }
    }

    /// energy-charts first (with `retry`), ENTSO-E as fallback when a key is set.
    pub fn with_http(
        region: Arc<Region>,
        storage_dir: Option<&Path>,
        client: Client,
        api_key: Option<String>,
        retry: RetryPolicy,
        breakers: &BreakerConfig,
        schedule: PublicationSchedule,
    ) -> Self {
        let label = format!("{}/{}", region.bidding_zone, StoreKind::Price);
        let energy_charts = EnergyChartsProvider::new(
            client.clone(),
            region.bidding_zone.clone(),
            Arc::new(breakers.build()),
        );
        let entsoe = EntsoeProvider::new(
            client,
            region.entsoe_domain.clone(),
            api_key,
            Arc::new(breakers.build()),
        );
        if !entsoe.has_api_key() {
            warn!(zone = %region.bidding_zone, "no ENTSO-E API key configured, energy-charts is the only price source");
        }
        let orchestrator = FallbackOrchestrator::new(label)
            .with_provider(Arc::new(energy_charts), retry)
            .with_provider(Arc::new(entsoe), RetryPolicy::none());
        Self::new(region, storage_dir, orchestrator, schedule)
    }

    pub fn with_constraints(mut self, constraints: PlannerConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn orchestrator(&self) -> &FallbackOrchestrator {
        &self.orchestrator
    }
}

impl DataStore for PriceStore {
    fn core(&self) -> &StoreCore {
        &self.core
    }

    fn fetch_missing_data(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.core
            .fetch_missing(start, end, &self.constraints, &self.orchestrator)
    }

    fn next_revalidation_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let cache = self.core.read();
        self.schedule
            .next_revalidation_time(&cache, self.core.region(), now)
    }
}
