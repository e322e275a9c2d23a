//! Remote forecast source contract and its scheduled implementation.
//!
//! # Responsibility
//! - Define what the repository needs from the network side.
//! - Run recurring and on-demand fetches on the async runtime.
//! - Broadcast completed forecast batches to subscribers.
//!
//! # Invariants
//! - Recurring fetch is started at most once per source.
//! - At most one fetch is in flight per source.
//! - Fetch failures are logged and dropped; the next trigger is the retry.

pub mod fetcher;
pub mod source;

pub use fetcher::{FetchError, ForecastFetcher, JsonFileFetcher};
pub use source::{
    ScheduledWeatherSource, SourceSettings, WeatherNetworkDataSource, NUM_DAYS, SYNC_INTERVAL,
};
