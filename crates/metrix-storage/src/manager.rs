use crate::error::{Result, StorageError};
use crate::SnapshotStore;
use metrix_common::{Metric, MetricStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Schedules snapshots of a live [`MetricStore`] onto a [`SnapshotStore`].
///
/// * [`restore_into`](Self::restore_into) runs once before serving.
/// * [`run`](Self::run) saves on every store interval and flushes once more
///   when cancelled.
/// * A zero interval switches to synchronous mode: callers invoke
///   [`after_ingest`](Self::after_ingest) after each accepted update.
///
/// Saves are serialized: the snapshot is taken under the save lock, so a
/// later save always writes a state at least as new as an earlier one.
/// Blocking backend calls run on tokio's blocking pool.
#[derive(Clone)]
pub struct PersistenceManager {
    backend: Arc<dyn SnapshotStore>,
    store: Arc<MetricStore>,
    interval: Duration,
    save_lock: Arc<Mutex<()>>,
}

impl PersistenceManager {
    pub fn new(backend: Arc<dyn SnapshotStore>, store: Arc<MetricStore>, interval: Duration) -> Self {
        Self {
            backend,
            store,
            interval,
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn is_synchronous(&self) -> bool {
        self.interval.is_zero()
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn SnapshotStore) -> Result<T> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || f(backend.as_ref()))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }

    /// Last saved snapshot, empty on fresh storage.
    pub async fn restore(&self) -> Result<Vec<Metric>> {
        self.blocking(|b| b.load()).await
    }

    /// Load the last snapshot into the live store. Returns the metric count.
    pub async fn restore_into(&self) -> Result<usize> {
        let snapshot = self.restore().await?;
        let count = snapshot.len();
        self.store.restore(snapshot);
        tracing::info!(backend = self.backend_name(), count, "Metrics restored");
        Ok(count)
    }

    /// Snapshot the store and write it out. Returns the metric count.
    pub async fn save_now(&self) -> Result<usize> {
        let _guard = self.save_lock.lock().await;
        let snapshot = self.store.snapshot();
        let count = snapshot.len();
        self.blocking(move |b| b.save(&snapshot)).await?;
        tracing::debug!(backend = self.backend_name(), count, "Metrics saved");
        Ok(count)
    }

    /// Synchronous-mode hook. Errors are logged, never returned to the
    /// request that triggered the save.
    pub async fn after_ingest(&self) {
        if !self.is_synchronous() {
            return;
        }
        if let Err(e) = self.save_now().await {
            tracing::error!(backend = self.backend_name(), error = %e, "Synchronous save failed");
        }
    }

    pub async fn ping(&self) -> Result<()> {
        self.blocking(|b| b.ping()).await
    }

    /// Periodic save loop. Returns after the final flush that follows
    /// cancellation.
    pub async fn run(&self, cancel: CancellationToken) {
        if self.is_synchronous() {
            cancel.cancelled().await;
        } else {
            tracing::info!(backend = self.backend_name(), interval_secs = self.interval.as_secs_f64(), "Starting snapshot loop");
            let mut tick = interval_at(Instant::now() + self.interval, self.interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        if let Err(e) = self.save_now().await {
                            tracing::error!(backend = self.backend_name(), error = %e, "Periodic save failed");
                        }
                    }
                }
            }
        }

        match self.save_now().await {
            Ok(count) => tracing::info!(backend = self.backend_name(), count, "Final snapshot flushed"),
            Err(e) => tracing::error!(backend = self.backend_name(), error = %e, "Final snapshot failed"),
        }
    }
}
