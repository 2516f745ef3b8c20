//! epexpredictor core: time-indexed delta-fetch caches for day-ahead price
//! forecasting.
//!
//! This crate holds the data layer the forecaster trains on:
//! - A sorted, duplicate-free 15-minute timeline per data kind, persisted as Parquet
//! - Day-granular gap planning so only missing local days are fetched
//! - Upstream providers (energy-charts, ENTSO-E, Open-Meteo) behind a fallback chain
//! - Locally derived calendar and solar features
//! - Per-kind revalidation schedules and a per-region warm-up coordinator

pub mod config;
pub mod data;
pub mod region;
pub mod schedule;
pub mod store;
pub mod warm;

pub use config::{AppConfig, ConfigError};
pub use data::{Frame, TimeSeriesCache};
pub use region::{Region, RegionName};
pub use store::{CalendarStore, DataStore, PriceStore, RegionStores, StoreError, StoreKind, WeatherStore};
pub use warm::{Refresh, RefreshOutcome, WarmCoordinator, WarmState};
