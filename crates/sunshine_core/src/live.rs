//! Push-based live query values.
//!
//! A [`LiveQuery`] holds the latest snapshot of a store query and is
//! refreshed by a background task whenever the store change version moves.
//!
//! # Invariants
//! - The first completed load is always published, even when it equals the
//!   placeholder default.
//! - Later loads are published only when the snapshot differs.
//! - The refresh task exits once every `LiveQuery` clone is dropped.

use crate::repo::weather_repo::{StoreResult, WeatherDao};
use log::{error, warn};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// Observable, continuously refreshed query result.
#[derive(Debug, Clone)]
pub struct LiveQuery<T> {
    rx: watch::Receiver<T>,
}

impl<T: Clone> LiveQuery<T> {
    /// Returns the current snapshot.
    pub fn get(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Waits until a new snapshot is published.
    ///
    /// Returns `false` when the refresh task has stopped.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Waits until the snapshot satisfies `predicate` and returns it.
    ///
    /// Returns `None` when the refresh task stops first.
    pub async fn wait_for(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        self.rx
            .wait_for(|value| predicate(value))
            .await
            .ok()
            .map(|value| value.clone())
    }
}

/// Starts a refresh task for `query` and returns its observable handle.
pub(crate) fn spawn_live_query<S, T, Q>(
    executor: &Handle,
    store: Arc<S>,
    name: &'static str,
    query: Q,
) -> LiveQuery<T>
where
    S: WeatherDao + ?Sized + 'static,
    T: Clone + Default + PartialEq + Send + Sync + 'static,
    Q: Fn(&S) -> StoreResult<T> + Send + Sync + 'static,
{
    let (tx, rx) = watch::channel(T::default());
    let mut changes = store.subscribe_changes();
    let query = Arc::new(query);

    executor.spawn(async move {
        let mut loaded = false;
        loop {
            changes.borrow_and_update();

            let store = Arc::clone(&store);
            let query = Arc::clone(&query);
            match tokio::task::spawn_blocking(move || query(store.as_ref())).await {
                Ok(Ok(value)) => {
                    if loaded {
                        tx.send_if_modified(|current| {
                            if *current == value {
                                return false;
                            }
                            *current = value;
                            true
                        });
                    } else {
                        tx.send_replace(value);
                        loaded = true;
                    }
                }
                Ok(Err(err)) => {
                    warn!(
                        "event=live_query_refresh module=live status=error query={} error={}",
                        name, err
                    );
                }
                Err(err) => {
                    error!(
                        "event=live_query_refresh module=live status=aborted query={} error={}",
                        name, err
                    );
                    break;
                }
            }

            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = tx.closed() => break,
            }
        }
    });

    LiveQuery { rx }
}
