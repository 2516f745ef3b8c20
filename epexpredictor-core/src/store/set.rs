//! The three stores of one region, refreshed together.

use super::{CalendarStore, DataStore, PriceStore, StoreError, StoreKind, WeatherStore};
use crate::config::{AppConfig, StorageConfig};
use crate::data::frame::Frame;
use crate::data::http;
use crate::region::Region;
use crate::warm::{Refresh, RefreshOutcome};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

pub struct RegionStores {
    region: Arc<Region>,
    price: PriceStore,
    weather: WeatherStore,
    calendar: CalendarStore,
    storage: StorageConfig,
    /// Revalidation time recorded when each store was last refreshed.
    due: Mutex<HashMap<StoreKind, DateTime<Utc>>>,
}

impl RegionStores {
    /// Build HTTP-backed stores for `region`, restoring snapshots from
    /// `config.storage.dir`.
    pub fn open(region: Arc<Region>, config: &AppConfig) -> Result<Self, StoreError> {
        let client = http::build_client(config.http.timeout(), &config.http.user_agent)?;
        let dir = config.storage.dir.as_deref();
        let retry = config.retry.policy();

        let price = PriceStore::with_http(
            Arc::clone(&region),
            dir,
            client.clone(),
            config.entsoe.api_key(),
            retry,
            &config.circuit_breaker,
            config.schedule.price_schedule(),
        );
        let weather = WeatherStore::with_http(
            Arc::clone(&region),
            dir,
            client,
            retry,
            &config.circuit_breaker,
            config.schedule.weather_schedule(),
        );
        let calendar = CalendarStore::new(Arc::clone(&region), config.schedule.calendar_schedule());

        Ok(Self::from_stores(region, price, weather, calendar, config.storage.clone()))
    }

    pub fn from_stores(
        region: Arc<Region>,
        price: PriceStore,
        weather: WeatherStore,
        calendar: CalendarStore,
        storage: StorageConfig,
    ) -> Self {
        Self {
            region,
            price,
            weather,
            calendar,
            storage,
            due: Mutex::new(HashMap::new()),
        }
    }

    fn due(&self) -> MutexGuard<'_, HashMap<StoreKind, DateTime<Utc>>> {
        self.due.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A store is due when it was never refreshed or its recorded
    /// revalidation time has passed.
    pub fn is_due(&self, kind: StoreKind, now: DateTime<Utc>) -> bool {
        self.due().get(&kind).map_or(true, |&at| now >= at)
    }

    pub fn region(&self) -> &Arc<Region> {
        &self.region
    }

    pub fn price(&self) -> &PriceStore {
        &self.price
    }

    pub fn weather(&self) -> &WeatherStore {
        &self.weather
    }

    pub fn calendar(&self) -> &CalendarStore {
        &self.calendar
    }

    pub fn stores(&self) -> [&dyn DataStore; 3] {
        [&self.price, &self.weather, &self.calendar]
    }

    pub fn store(&self, kind: StoreKind) -> &dyn DataStore {
        match kind {
            StoreKind::Price => &self.price,
            StoreKind::Weather => &self.weather,
            StoreKind::Calendar => &self.calendar,
        }
    }

    /// Drop rows older than the retention period. Returns rows removed.
    pub fn cleanup(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(self.storage.retention_days);
        self.stores()
            .iter()
            .map(|store| store.drop_before(cutoff))
            .sum()
    }

    /// Earliest revalidation time over all stores. Stores refreshed by
    /// [`refresh_at`](Self::refresh_at) report the time recorded then.
    pub fn next_revalidation_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let due = self.due();
        self.stores()
            .iter()
            .map(|store| {
                due.get(&store.kind())
                    .copied()
                    .unwrap_or_else(|| store.next_revalidation_time(now))
            })
            .min()
            .unwrap_or(now)
    }

    /// Outer join of weather, calendar and price rows in `[start, end]`.
    /// Cached data only.
    pub fn feature_frame(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Frame {
        let weather = self.weather.get_known(start, end);
        let calendar = self.calendar.get_known(start, end);
        let price = self.price.get_known(start, end);
        Frame::outer_join(&[&weather, &calendar, &price])
    }

    /// One cycle: retention on every store, then each due store is worked
    /// over the training plus forecast window. Weather additionally refetches
    /// its forecast from `now` on. Stores not yet due are left alone.
    pub fn refresh_at(&self, now: DateTime<Utc>) -> RefreshOutcome {
        let removed = self.cleanup(now);
        let start = now - Duration::days(self.storage.training_days);
        let end = now + Duration::days(self.storage.forecast_days);

        let mut updated = Vec::new();
        for store in self.stores() {
            let kind = store.kind();
            if !self.is_due(kind, now) {
                debug!(store = %kind, "not due, skipping");
                continue;
            }
            let refetched = kind == StoreKind::Weather && self.weather.refresh_range(now, end);
            if store.fetch_missing_data(start, end) || refetched {
                updated.push(kind);
            }
            self.due().insert(kind, store.next_revalidation_time(now));
        }

        let next_refresh = self.next_revalidation_time(now);
        info!(
            zone = %self.region.bidding_zone,
            removed,
            updated = ?updated,
            %next_refresh,
            "region refreshed"
        );
        RefreshOutcome {
            updated,
            next_refresh,
        }
    }
}

impl Refresh for RegionStores {
    fn refresh(&self, now: DateTime<Utc>) -> RefreshOutcome {
        self.refresh_at(now)
    }

    fn is_populated(&self) -> bool {
        self.stores().iter().any(|store| !store.core().is_empty())
    }
}
