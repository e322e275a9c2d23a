//! Weather table access: the `WeatherDao` contract and its SQLite store.
//!
//! # Responsibility
//! - Query current forecasts, single days and future-day counts.
//! - Apply replace-on-conflict batch inserts and old-day deletion.
//! - Notify observers through a monotonically increasing change version.
//!
//! # Invariants
//! - `date` is unique; inserting an existing date replaces the stored row.
//! - The change version only moves after a commit that changed rows.
//! - A merge always deletes past days; invalid batch entries are skipped.
//! - Merged rows get store-assigned ids; remote ids carry no local meaning.
//! - Read paths reject undecodable rows instead of masking them.

use crate::clock::{from_epoch_millis, to_epoch_millis};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::weather::{ListWeatherEntry, WeatherEntry, WeatherId, WeatherValidationError};
use chrono::NaiveDate;
use log::{debug, warn};
use rusqlite::{params, Connection, Row, Transaction};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

const WEATHER_SELECT_SQL: &str = "SELECT
    id,
    weather_icon_id,
    date,
    min,
    max,
    humidity,
    pressure,
    wind,
    degrees
FROM weather";

const WEATHER_UPSERT_SQL: &str = "INSERT OR REPLACE INTO weather (
    id,
    weather_icon_id,
    date,
    min,
    max,
    humidity,
    pressure,
    wind,
    degrees
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);";

pub type StoreResult<T> = Result<T, StoreError>;

/// Error for weather table queries and mutations.
#[derive(Debug)]
pub enum StoreError {
    Validation(WeatherValidationError),
    Db(DbError),
    InvalidData(String),
    /// A previous holder of the connection lock panicked.
    LockPoisoned,
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted weather data: {message}"),
            Self::LockPoisoned => write!(f, "weather store connection lock poisoned"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidData(_) | Self::LockPoisoned => None,
        }
    }
}

impl From<WeatherValidationError> for StoreError {
    fn from(value: WeatherValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Row counts produced by one delete-then-insert merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub deleted: usize,
    /// Rows written, as reported by SQLite.
    pub inserted: usize,
    /// Batch entries dropped by validation.
    pub skipped: usize,
}

/// Data access contract for the local weather cache.
pub trait WeatherDao: Send + Sync {
    /// Entries dated on or after `from`, ordered by date ascending.
    fn current_weather_forecasts(&self, from: NaiveDate) -> StoreResult<Vec<ListWeatherEntry>>;
    /// The entry stored for exactly `date`.
    fn weather_by_date(&self, date: NaiveDate) -> StoreResult<Option<WeatherEntry>>;
    /// Number of entries dated on or after `from`.
    fn count_all_future_weather(&self, from: NaiveDate) -> StoreResult<u32>;
    /// Inserts entries, replacing any stored row with the same date or id.
    fn bulk_insert(&self, entries: &[WeatherEntry]) -> StoreResult<usize>;
    /// Deletes entries dated strictly before `before`.
    fn delete_old_weather(&self, before: NaiveDate) -> StoreResult<usize>;
    /// Deletes entries before `before` and inserts the valid `entries` in one
    /// transaction. Invalid entries are skipped, never fail the merge.
    fn replace_old_with(
        &self,
        before: NaiveDate,
        entries: &[WeatherEntry],
    ) -> StoreResult<MergeOutcome>;
    /// Change version that moves after every committed mutation.
    fn subscribe_changes(&self) -> watch::Receiver<u64>;
}

/// SQLite-backed weather store.
///
/// The connection sits behind a mutex so the store can be shared across the
/// blocking pool; `rusqlite::Connection` is `Send` but not `Sync`.
pub struct SqliteWeatherStore {
    conn: Mutex<Connection>,
    changes: watch::Sender<u64>,
}

impl SqliteWeatherStore {
    /// Wraps a connection that already has migrations applied.
    pub fn new(conn: Connection) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            conn: Mutex::new(conn),
            changes,
        }
    }

    /// Opens (or creates) the weather database at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn notify_changed(&self) {
        self.changes.send_modify(|version| *version += 1);
    }
}

impl WeatherDao for SqliteWeatherStore {
    fn current_weather_forecasts(&self, from: NaiveDate) -> StoreResult<Vec<ListWeatherEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{WEATHER_SELECT_SQL} WHERE date >= ?1 ORDER BY date ASC;"
        ))?;
        let mut rows = stmt.query([to_epoch_millis(from)])?;
        let mut entries = Vec::new();

        while let Some(row) = rows.next()? {
            entries.push(parse_weather_row(row)?.to_list_entry());
        }

        Ok(entries)
    }

    fn weather_by_date(&self, date: NaiveDate) -> StoreResult<Option<WeatherEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{WEATHER_SELECT_SQL} WHERE date = ?1;"))?;
        let mut rows = stmt.query([to_epoch_millis(date)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_weather_row(row)?));
        }

        Ok(None)
    }

    fn count_all_future_weather(&self, from: NaiveDate) -> StoreResult<u32> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(id) FROM weather WHERE date >= ?1;",
            [to_epoch_millis(from)],
            |row| row.get(0),
        )?;
        u32::try_from(count)
            .map_err(|_| StoreError::InvalidData(format!("future weather count `{count}` overflows")))
    }

    fn bulk_insert(&self, entries: &[WeatherEntry]) -> StoreResult<usize> {
        validate_all(entries)?;
        if entries.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let inserted = upsert_all(&tx, entries, IdPolicy::KeepPositive)?;
        tx.commit()?;
        drop(conn);

        debug!(
            "event=weather_bulk_insert module=repo status=ok inserted={}",
            inserted
        );
        self.notify_changed();
        Ok(inserted)
    }

    fn delete_old_weather(&self, before: NaiveDate) -> StoreResult<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM weather WHERE date < ?1;",
            [to_epoch_millis(before)],
        )?;
        drop(conn);

        debug!(
            "event=weather_delete_old module=repo status=ok before={} deleted={}",
            before, deleted
        );
        if deleted > 0 {
            self.notify_changed();
        }
        Ok(deleted)
    }

    fn replace_old_with(
        &self,
        before: NaiveDate,
        entries: &[WeatherEntry],
    ) -> StoreResult<MergeOutcome> {
        let mut valid = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.validate() {
                Ok(()) => valid.push(entry.clone()),
                Err(err) => warn!(
                    "event=weather_merge module=repo status=skipped_entry error={}",
                    err
                ),
            }
        }
        let skipped = entries.len() - valid.len();

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM weather WHERE date < ?1;",
            [to_epoch_millis(before)],
        )?;
        let inserted = upsert_all(&tx, &valid, IdPolicy::Assign)?;
        tx.commit()?;
        drop(conn);

        let outcome = MergeOutcome {
            deleted,
            inserted,
            skipped,
        };
        if deleted > 0 || inserted > 0 {
            self.notify_changed();
        }
        Ok(outcome)
    }

    fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

fn validate_all(entries: &[WeatherEntry]) -> StoreResult<()> {
    for entry in entries {
        entry.validate()?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum IdPolicy {
    /// Positive ids are written as-is; zero or negative means "assign".
    KeepPositive,
    /// Every row gets a fresh store-assigned id.
    Assign,
}

impl IdPolicy {
    fn resolve(self, id: Option<WeatherId>) -> Option<WeatherId> {
        match self {
            Self::KeepPositive => id.filter(|value| *value > 0),
            Self::Assign => None,
        }
    }
}

fn upsert_all(
    tx: &Transaction<'_>,
    entries: &[WeatherEntry],
    ids: IdPolicy,
) -> StoreResult<usize> {
    let mut stmt = tx.prepare(WEATHER_UPSERT_SQL)?;
    let mut written = 0;
    for entry in entries {
        written += stmt.execute(params![
            ids.resolve(entry.id),
            entry.weather_icon_id,
            to_epoch_millis(entry.date),
            entry.min,
            entry.max,
            entry.humidity,
            entry.pressure,
            entry.wind,
            entry.degrees,
        ])?;
    }
    Ok(written)
}

fn parse_weather_row(row: &Row<'_>) -> StoreResult<WeatherEntry> {
    let date_millis: i64 = row.get("date")?;
    let date = from_epoch_millis(date_millis).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid date value `{date_millis}` in weather.date"))
    })?;

    Ok(WeatherEntry {
        id: Some(row.get("id")?),
        weather_icon_id: row.get("weather_icon_id")?,
        date,
        min: row.get("min")?,
        max: row.get("max")?,
        humidity: row.get("humidity")?,
        pressure: row.get("pressure")?,
        wind: row.get("wind")?,
        degrees: row.get("degrees")?,
    })
}

#[cfg(test)]
mod tests {
    use super::{SqliteWeatherStore, WeatherDao};
    use crate::model::weather::WeatherEntry;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).expect("valid date")
    }

    #[test]
    fn change_version_moves_only_on_effective_writes() {
        let store = SqliteWeatherStore::open_in_memory().expect("store should open");
        let changes = store.subscribe_changes();
        assert_eq!(*changes.borrow(), 0);

        store.bulk_insert(&[]).expect("empty insert should succeed");
        store
            .delete_old_weather(day(1))
            .expect("delete on empty table should succeed");
        assert_eq!(*changes.borrow(), 0);

        store
            .bulk_insert(&[WeatherEntry::new(day(2), 800, 1.0, 2.0)])
            .expect("insert should succeed");
        assert_eq!(*changes.borrow(), 1);
    }

    #[test]
    fn bulk_insert_treats_zero_id_as_unassigned() {
        let store = SqliteWeatherStore::open_in_memory().expect("store should open");
        let batch: Vec<_> = (2..5)
            .map(|d| WeatherEntry {
                id: Some(0),
                ..WeatherEntry::new(day(d), 800, 1.0, 2.0)
            })
            .collect();

        let inserted = store.bulk_insert(&batch).expect("insert should succeed");
        assert_eq!(inserted, 3);
        assert_eq!(
            store
                .count_all_future_weather(day(1))
                .expect("count should succeed"),
            3
        );
    }

    #[test]
    fn invalid_entry_rejects_whole_batch() {
        let store = SqliteWeatherStore::open_in_memory().expect("store should open");
        let batch = vec![
            WeatherEntry::new(day(2), 800, 1.0, 2.0),
            WeatherEntry::new(day(3), 800, 9.0, 2.0),
        ];

        store
            .bulk_insert(&batch)
            .expect_err("invalid entry should fail the batch");
        assert_eq!(
            store
                .count_all_future_weather(day(1))
                .expect("count should succeed"),
            0
        );
    }
}
