//! Scheduled remote forecast source.

use crate::config::SunshineConfig;
use crate::model::weather::ForecastBatch;
use crate::network::fetcher::ForecastFetcher;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

/// Days of forecast the UI needs cached before a fetch is unnecessary.
pub const NUM_DAYS: u32 = 14;

/// Default period of the recurring background fetch.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(3 * 60 * 60);

const BATCH_CHANNEL_CAPACITY: usize = 16;

/// Contract the repository consumes from the network side.
pub trait WeatherNetworkDataSource: Send + Sync {
    /// Long-lived stream of batches, one per completed fetch.
    fn subscribe_forecasts(&self) -> broadcast::Receiver<ForecastBatch>;
    /// Starts the recurring background refresh. Idempotent.
    fn schedule_recurring_fetch(&self);
    /// Requests an immediate fetch. Idempotent while one is in flight.
    fn fetch_now(&self);
    /// Required look-ahead window, in days.
    fn num_days(&self) -> u32 {
        NUM_DAYS
    }
}

/// Tuning for [`ScheduledWeatherSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSettings {
    pub sync_interval: Duration,
    pub num_days: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            sync_interval: SYNC_INTERVAL,
            num_days: NUM_DAYS,
        }
    }
}

impl From<&SunshineConfig> for SourceSettings {
    fn from(config: &SunshineConfig) -> Self {
        Self {
            sync_interval: config.sync_interval(),
            num_days: config.forecast_days,
        }
    }
}

/// Runs a [`ForecastFetcher`] on the runtime and broadcasts its batches.
pub struct ScheduledWeatherSource<F: ForecastFetcher> {
    inner: Arc<SourceInner<F>>,
}

struct SourceInner<F> {
    fetcher: F,
    executor: Handle,
    batches: broadcast::Sender<ForecastBatch>,
    settings: SourceSettings,
    recurring_started: AtomicBool,
    fetch_in_flight: AtomicBool,
}

impl<F: ForecastFetcher> ScheduledWeatherSource<F> {
    pub fn new(fetcher: F, executor: Handle, settings: SourceSettings) -> Self {
        let (batches, _) = broadcast::channel(BATCH_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(SourceInner {
                fetcher,
                executor,
                batches,
                settings,
                recurring_started: AtomicBool::new(false),
                fetch_in_flight: AtomicBool::new(false),
            }),
        }
    }

    pub fn settings(&self) -> SourceSettings {
        self.inner.settings
    }
}

impl<F: ForecastFetcher> WeatherNetworkDataSource for ScheduledWeatherSource<F> {
    fn subscribe_forecasts(&self) -> broadcast::Receiver<ForecastBatch> {
        self.inner.batches.subscribe()
    }

    fn schedule_recurring_fetch(&self) {
        if self.inner.recurring_started.swap(true, Ordering::SeqCst) {
            debug!("event=recurring_fetch module=network status=skipped reason=already_scheduled");
            return;
        }

        let interval = self.inner.settings.sync_interval;
        let weak = Arc::downgrade(&self.inner);
        self.inner.executor.spawn(run_recurring_fetch(weak, interval));
        info!(
            "event=recurring_fetch module=network status=scheduled interval_secs={}",
            interval.as_secs()
        );
    }

    fn fetch_now(&self) {
        SourceInner::trigger_fetch(&self.inner);
    }

    fn num_days(&self) -> u32 {
        self.inner.settings.num_days
    }
}

impl<F: ForecastFetcher> SourceInner<F> {
    fn trigger_fetch(inner: &Arc<Self>) {
        if inner.fetch_in_flight.swap(true, Ordering::SeqCst) {
            debug!("event=fetch module=network status=skipped reason=in_flight");
            return;
        }

        let worker = Arc::clone(inner);
        inner.executor.spawn(async move {
            let started_at = Instant::now();
            let fetcher_owner = Arc::clone(&worker);
            let result = tokio::task::spawn_blocking(move || fetcher_owner.fetcher.fetch()).await;

            match result {
                Ok(Ok(batch)) => {
                    let size = batch.len();
                    match worker.batches.send(batch) {
                        Ok(receivers) => info!(
                            "event=fetch module=network status=ok entries={} receivers={} duration_ms={}",
                            size,
                            receivers,
                            started_at.elapsed().as_millis()
                        ),
                        Err(_) => warn!(
                            "event=fetch module=network status=dropped entries={} reason=no_subscribers",
                            size
                        ),
                    }
                }
                Ok(Err(err)) => warn!(
                    "event=fetch module=network status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                ),
                Err(err) => warn!(
                    "event=fetch module=network status=aborted error={}",
                    err
                ),
            }

            worker.fetch_in_flight.store(false, Ordering::SeqCst);
        });
    }
}

async fn run_recurring_fetch<F: ForecastFetcher>(source: Weak<SourceInner<F>>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick fires immediately; the repository decides on the initial fetch.
    interval.tick().await;

    loop {
        interval.tick().await;
        let Some(inner) = source.upgrade() else {
            debug!("event=recurring_fetch module=network status=stopped reason=source_dropped");
            break;
        };
        SourceInner::trigger_fetch(&inner);
    }
}
