//! Weather repository: one-time sync initialization and merge-on-update.
//!
//! # Responsibility
//! - Expose live views of current forecasts and single days.
//! - On first read, schedule recurring fetches and fetch immediately when the
//!   cache does not cover the look-ahead window.
//! - Merge every batch from the remote stream into the local store.
//!
//! # Invariants
//! - Initialization runs at most once per repository instance.
//! - The initialized flag is set under its lock before any work is dispatched.
//! - Merges are serialized: one worker consumes batches in order.
//! - "today" is read from the clock when a merge runs, not when subscribing.
//! - A merge deletes days before today and inserts the batch atomically.

use crate::clock::{Clock, SystemClock};
use crate::live::{spawn_live_query, LiveQuery};
use crate::model::weather::{ListWeatherEntry, WeatherEntry};
use crate::network::source::WeatherNetworkDataSource;
use crate::repo::weather_repo::{MergeOutcome, StoreResult, WeatherDao};
use chrono::NaiveDate;
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Mediator between the local weather cache and the remote forecast source.
///
/// Construct one instance at startup and share it; the merge subscription
/// lives exactly as long as the instance.
pub struct SunshineRepository<S, N>
where
    S: WeatherDao + 'static,
    N: WeatherNetworkDataSource + 'static,
{
    store: Arc<S>,
    network: Arc<N>,
    executor: Handle,
    clock: Arc<dyn Clock>,
    initialized: Mutex<bool>,
    merge_worker: JoinHandle<()>,
}

impl<S, N> SunshineRepository<S, N>
where
    S: WeatherDao + 'static,
    N: WeatherNetworkDataSource + 'static,
{
    /// Creates the repository and subscribes to the forecast stream.
    pub fn new(store: Arc<S>, network: Arc<N>, executor: Handle, clock: Arc<dyn Clock>) -> Self {
        let batches = network.subscribe_forecasts();
        let merge_worker = executor.spawn(run_merge_worker(
            Arc::clone(&store),
            Arc::clone(&clock),
            batches,
        ));
        info!("event=repository_create module=service status=ok");

        Self {
            store,
            network,
            executor,
            clock,
            initialized: Mutex::new(false),
            merge_worker,
        }
    }

    /// Same as [`SunshineRepository::new`] with the wall clock.
    pub fn with_system_clock(store: Arc<S>, network: Arc<N>, executor: Handle) -> Self {
        Self::new(store, network, executor, Arc::new(SystemClock))
    }

    /// Live list of every cached forecast from today onwards, by date.
    pub fn current_weather_forecasts(&self) -> LiveQuery<Vec<ListWeatherEntry>> {
        self.initialize_data();
        let today = self.clock.today();
        spawn_live_query(
            &self.executor,
            Arc::clone(&self.store),
            "current_weather_forecasts",
            move |store| store.current_weather_forecasts(today),
        )
    }

    /// Live view of the forecast stored for exactly `date`.
    pub fn weather_by_date(&self, date: NaiveDate) -> LiveQuery<Option<WeatherEntry>> {
        self.initialize_data();
        spawn_live_query(
            &self.executor,
            Arc::clone(&self.store),
            "weather_by_date",
            move |store| store.weather_by_date(date),
        )
    }

    /// Whether the one-time sync initialization has run.
    pub fn is_initialized(&self) -> bool {
        *lock_flag(&self.initialized)
    }

    /// Runs the one-time sync setup; `None` when it already ran.
    ///
    /// The returned handle resolves to whether an immediate fetch was requested.
    fn initialize_data(&self) -> Option<JoinHandle<bool>> {
        let mut initialized = lock_flag(&self.initialized);
        if *initialized {
            return None;
        }
        *initialized = true;

        self.network.schedule_recurring_fetch();

        let store = Arc::clone(&self.store);
        let network = Arc::clone(&self.network);
        let clock = Arc::clone(&self.clock);
        let check = self.executor.spawn_blocking(move || {
            let today = clock.today();
            let fetch_needed = match is_fetch_needed(store.as_ref(), today, network.num_days()) {
                Ok(needed) => needed,
                Err(err) => {
                    error!(
                        "event=staleness_check module=service status=error error={}",
                        err
                    );
                    true
                }
            };
            if fetch_needed {
                info!("event=staleness_check module=service status=stale action=fetch_now");
                network.fetch_now();
            } else {
                debug!("event=staleness_check module=service status=fresh");
            }
            fetch_needed
        });
        drop(initialized);

        info!("event=repository_init module=service status=ok");
        Some(check)
    }
}

impl<S, N> Drop for SunshineRepository<S, N>
where
    S: WeatherDao + 'static,
    N: WeatherNetworkDataSource + 'static,
{
    fn drop(&mut self) {
        self.merge_worker.abort();
    }
}

/// Whether the store holds fewer than `num_days` entries from `today` on.
pub fn is_fetch_needed<S>(store: &S, today: NaiveDate, num_days: u32) -> StoreResult<bool>
where
    S: WeatherDao + ?Sized,
{
    let count = store.count_all_future_weather(today)?;
    Ok(count < num_days)
}

/// Drops days before `today` and upserts the valid part of `batch`, as one
/// transaction.
pub fn merge_forecast_batch<S>(
    store: &S,
    today: NaiveDate,
    batch: &[WeatherEntry],
) -> StoreResult<MergeOutcome>
where
    S: WeatherDao + ?Sized,
{
    let outcome = store.replace_old_with(today, batch)?;
    info!(
        "event=forecast_merge module=service status=ok today={} deleted={} inserted={} skipped={}",
        today, outcome.deleted, outcome.inserted, outcome.skipped
    );
    Ok(outcome)
}

async fn run_merge_worker<S>(
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    mut batches: broadcast::Receiver<Vec<WeatherEntry>>,
) where
    S: WeatherDao + 'static,
{
    loop {
        let batch = match batches.recv().await {
            Ok(batch) => batch,
            Err(RecvError::Lagged(skipped)) => {
                warn!(
                    "event=forecast_merge module=service status=lagged skipped_batches={}",
                    skipped
                );
                continue;
            }
            Err(RecvError::Closed) => {
                info!("event=forecast_merge module=service status=stopped reason=stream_closed");
                break;
            }
        };

        let store = Arc::clone(&store);
        let clock = Arc::clone(&clock);
        let merged = tokio::task::spawn_blocking(move || {
            merge_forecast_batch(store.as_ref(), clock.today(), &batch)
        })
        .await;

        match merged {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => error!(
                "event=forecast_merge module=service status=error error={}",
                err
            ),
            Err(err) => error!(
                "event=forecast_merge module=service status=aborted error={}",
                err
            ),
        }
    }
}

fn lock_flag(flag: &Mutex<bool>) -> std::sync::MutexGuard<'_, bool> {
    flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::SunshineRepository;
    use crate::clock::Clock;
    use crate::model::weather::{ForecastBatch, WeatherEntry};
    use crate::network::source::WeatherNetworkDataSource;
    use crate::repo::weather_repo::{SqliteWeatherStore, WeatherDao};
    use chrono::{Days, NaiveDate};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::runtime::Handle;
    use tokio::sync::broadcast;

    struct FixedClock(NaiveDate);

    impl Clock for FixedClock {
        fn today(&self) -> NaiveDate {
            self.0
        }
    }

    struct CountingNetwork {
        batches: broadcast::Sender<ForecastBatch>,
        scheduled: AtomicUsize,
        fetches: AtomicUsize,
        num_days: u32,
    }

    impl CountingNetwork {
        fn new(num_days: u32) -> Self {
            let (batches, _) = broadcast::channel(4);
            Self {
                batches,
                scheduled: AtomicUsize::new(0),
                fetches: AtomicUsize::new(0),
                num_days,
            }
        }
    }

    impl WeatherNetworkDataSource for CountingNetwork {
        fn subscribe_forecasts(&self) -> broadcast::Receiver<ForecastBatch> {
            self.batches.subscribe()
        }

        fn schedule_recurring_fetch(&self) {
            self.scheduled.fetch_add(1, Ordering::SeqCst);
        }

        fn fetch_now(&self) {
            self.fetches.fetch_add(1, Ordering::SeqCst);
        }

        fn num_days(&self) -> u32 {
            self.num_days
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 10).expect("valid date")
    }

    fn seeded_store(days: u64) -> Arc<SqliteWeatherStore> {
        let store = SqliteWeatherStore::open_in_memory().expect("store should open");
        let entries: Vec<_> = (0..days)
            .map(|offset| {
                let date = today()
                    .checked_add_days(Days::new(offset))
                    .expect("date in range");
                WeatherEntry::new(date, 800, 5.0, 15.0)
            })
            .collect();
        store.bulk_insert(&entries).expect("seed should insert");
        Arc::new(store)
    }

    fn repository(
        store: Arc<SqliteWeatherStore>,
        network: Arc<CountingNetwork>,
    ) -> SunshineRepository<SqliteWeatherStore, CountingNetwork> {
        SunshineRepository::new(store, network, Handle::current(), Arc::new(FixedClock(today())))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn one_day_short_of_window_triggers_fetch() {
        let network = Arc::new(CountingNetwork::new(14));
        let repo = repository(seeded_store(13), Arc::clone(&network));

        let check = repo.initialize_data().expect("first call should initialize");
        assert!(check.await.expect("staleness check should finish"));
        assert_eq!(network.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn full_window_does_not_trigger_fetch() {
        let network = Arc::new(CountingNetwork::new(14));
        let repo = repository(seeded_store(14), Arc::clone(&network));

        let check = repo.initialize_data().expect("first call should initialize");
        assert!(!check.await.expect("staleness check should finish"));
        assert_eq!(network.fetches.load(Ordering::SeqCst), 0);
        assert_eq!(network.scheduled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn entries_before_today_do_not_count_toward_window() {
        let network = Arc::new(CountingNetwork::new(2));
        let store = seeded_store(1);
        let yesterday = today().pred_opt().expect("date in range");
        store
            .bulk_insert(&[WeatherEntry::new(yesterday, 800, 1.0, 2.0)])
            .expect("insert should succeed");
        let repo = repository(store, Arc::clone(&network));

        let check = repo.initialize_data().expect("first call should initialize");
        assert!(check.await.expect("staleness check should finish"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn second_initialization_is_a_no_op() {
        let network = Arc::new(CountingNetwork::new(14));
        let repo = repository(seeded_store(0), Arc::clone(&network));

        assert!(!repo.is_initialized());
        let first = repo.initialize_data().expect("first call should initialize");
        assert!(repo.initialize_data().is_none());
        first.await.expect("staleness check should finish");

        let _live = repo.current_weather_forecasts();
        assert!(repo.is_initialized());
        assert_eq!(network.scheduled.load(Ordering::SeqCst), 1);
        assert_eq!(network.fetches.load(Ordering::SeqCst), 1);
    }
}
