//! Data layer: frames, the in-memory cache, Parquet snapshots, gap planning
//! and the upstream providers.

pub mod cache;
pub mod calendar;
pub mod circuit_breaker;
pub mod energy_charts;
pub mod entsoe;
pub mod fallback;
pub mod frame;
pub mod http;
pub mod open_meteo;
pub mod planner;
pub mod provider;
pub mod snapshot;
pub mod solar;

/// Day-ahead price column, in ct/kWh.
pub const PRICE_COLUMN: &str = "price";

pub use cache::TimeSeriesCache;
pub use circuit_breaker::{CircuitBreaker, TripCause};
pub use fallback::{Backoff, FallbackOrchestrator, RetryPolicy};
pub use frame::{Frame, TimeSeriesRow};
pub use planner::{plan_gaps, Gap, PlannerConstraints};
pub use provider::{FetchError, FetchWindow, Provider};
pub use snapshot::{SnapshotError, SnapshotFile};
