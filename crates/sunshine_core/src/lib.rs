//! Weather data layer for Sunshine.
//!
//! A repository mediates between a local SQLite forecast cache and a remote
//! forecast source, exposing live, self-refreshing query views.

pub mod clock;
pub mod config;
pub mod db;
pub mod live;
pub mod logging;
pub mod model;
pub mod network;
pub mod repo;
pub mod service;

pub use clock::{normalized_utc_date_for_today, Clock, SystemClock};
pub use config::{ConfigError, SunshineConfig};
pub use live::LiveQuery;
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::weather::{
    ForecastBatch, ListWeatherEntry, WeatherEntry, WeatherId, WeatherValidationError,
};
pub use network::{
    FetchError, ForecastFetcher, JsonFileFetcher, ScheduledWeatherSource, SourceSettings,
    WeatherNetworkDataSource, NUM_DAYS, SYNC_INTERVAL,
};
pub use repo::weather_repo::{
    MergeOutcome, SqliteWeatherStore, StoreError, StoreResult, WeatherDao,
};
pub use service::sunshine_repository::{is_fetch_needed, merge_forecast_batch, SunshineRepository};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
