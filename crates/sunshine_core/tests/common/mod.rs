#![allow(dead_code)]

use chrono::{Days, NaiveDate};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use sunshine_core::{Clock, ForecastBatch, WeatherEntry, WeatherNetworkDataSource};
use tokio::sync::broadcast;

/// Clock whose "today" tests can move forward.
pub struct ManualClock {
    today: Mutex<NaiveDate>,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    pub fn set(&self, today: NaiveDate) {
        *self.today.lock().unwrap() = today;
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap()
    }
}

/// Remote source double that records calls and emits batches on demand.
pub struct FakeNetwork {
    batches: broadcast::Sender<ForecastBatch>,
    on_fetch: Mutex<Option<ForecastBatch>>,
    pub scheduled: AtomicUsize,
    pub fetches: AtomicUsize,
    num_days: u32,
}

impl FakeNetwork {
    pub fn new(num_days: u32) -> Self {
        let (batches, _) = broadcast::channel(8);
        Self {
            batches,
            on_fetch: Mutex::new(None),
            scheduled: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            num_days,
        }
    }

    /// Batch to publish when `fetch_now` is called.
    pub fn respond_to_fetch_with(&self, batch: ForecastBatch) {
        *self.on_fetch.lock().unwrap() = Some(batch);
    }

    /// Publishes a batch as if a fetch just completed.
    pub fn emit(&self, batch: ForecastBatch) {
        self.batches.send(batch).unwrap();
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl WeatherNetworkDataSource for FakeNetwork {
    fn subscribe_forecasts(&self) -> broadcast::Receiver<ForecastBatch> {
        self.batches.subscribe()
    }

    fn schedule_recurring_fetch(&self) {
        self.scheduled.fetch_add(1, Ordering::SeqCst);
    }

    fn fetch_now(&self) {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(batch) = self.on_fetch.lock().unwrap().clone() {
            let _ = self.batches.send(batch);
        }
    }

    fn num_days(&self) -> u32 {
        self.num_days
    }
}

pub fn day_after(base: NaiveDate, offset: u64) -> NaiveDate {
    base.checked_add_days(Days::new(offset)).unwrap()
}

pub fn forecast_from(start: NaiveDate, days: u64) -> ForecastBatch {
    (0..days)
        .map(|offset| {
            let min = offset as f64;
            WeatherEntry::new(day_after(start, offset), 800, min, min + 10.0)
        })
        .collect()
}
