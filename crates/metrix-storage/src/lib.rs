//! Durable snapshots of a [`MetricStore`](metrix_common::MetricStore).
//!
//! Two backends implement [`SnapshotStore`]: a single-line JSON file
//! ([`file::FileSnapshotStore`]) and a SQLite table
//! ([`sqlite::SqliteSnapshotStore`]). [`manager::PersistenceManager`] owns
//! the restore-before-serve, periodic save and final flush schedule.

pub mod error;
pub mod file;
pub mod manager;
pub mod sqlite;


use error::Result;
use metrix_common::Metric;
use std::path::Path;
use std::sync::Arc;

/// Whole-snapshot persistence backend.
///
/// Calls are blocking; async callers go through
/// [`manager::PersistenceManager`], which moves them onto the blocking pool.
pub trait SnapshotStore: Send + Sync {
    /// Backend name for logs (e.g., `"file"`, `"sqlite"`).
    fn name(&self) -> &str;

    /// Reads the last saved snapshot. Absent or empty storage yields an
    /// empty vector, not an error.
    fn load(&self) -> Result<Vec<Metric>>;

    /// Atomically replaces the stored snapshot.
    fn save(&self, snapshot: &[Metric]) -> Result<()>;

    /// Cheap reachability check used by health endpoints.
    fn ping(&self) -> Result<()>;
}

/// Pick a backend from configuration. A database DSN takes precedence over a
/// file path; neither configured means persistence is disabled.
pub fn open_backend(
    file_path: Option<&Path>,
    database_dsn: Option<&str>,
) -> Result<Option<Arc<dyn SnapshotStore>>> {
    if let Some(dsn) = database_dsn.filter(|d| !d.is_empty()) {
        let store = sqlite::SqliteSnapshotStore::open(dsn)?;
        return Ok(Some(Arc::new(store)));
    }
    if let Some(path) = file_path.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(Some(Arc::new(file::FileSnapshotStore::new(path))));
    }
    Ok(None)
}
