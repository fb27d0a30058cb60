use crate::error::{Result, StorageError};
use crate::SnapshotStore;
use metrix_common::retry::{RetryError, RetryPolicy};
use metrix_common::{Metric, MetricKind, MetricValue};
use rusqlite::{params, Connection, ErrorCode};
use std::sync::{Mutex, MutexGuard};

const METRICS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS metrics (
    id     TEXT PRIMARY KEY,
    mtype  TEXT NOT NULL,
    delta  INTEGER,
    mvalue REAL
);
";

const UPSERT: &str = "
INSERT INTO metrics (id, mtype, delta, mvalue) VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(id) DO UPDATE SET mtype = excluded.mtype, delta = excluded.delta, mvalue = excluded.mvalue
";

/// One row per metric id in a `metrics` table.
pub struct SqliteSnapshotStore {
    conn: Mutex<Connection>,
    retry: RetryPolicy,
}

/// Busy and locked databases clear up on their own; everything else is
/// reported immediately.
fn is_transient(err: &StorageError) -> bool {
    match err {
        StorageError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
            matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        }
        _ => false,
    }
}

impl SqliteSnapshotStore {
    /// Open (or create) the database at `dsn`, a file path or `:memory:`.
    pub fn open(dsn: &str) -> Result<Self> {
        let conn = Connection::open(dsn)?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(METRICS_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            retry: RetryPolicy::persistence(),
        })
    }

    /// Replace the delay table used for transient failures.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Lock the connection, recovering from a poisoned Mutex if necessary.
    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_all(&self, snapshot: &[Metric]) -> Result<()> {
        let mut conn = self.lock_conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT)?;
            for metric in snapshot {
                stmt.execute(params![
                    metric.id(),
                    metric.kind().as_str(),
                    metric.counter_value(),
                    metric.gauge_value(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn row_to_metric(id: String, mtype: String, delta: Option<i64>, mvalue: Option<f64>) -> Result<Metric> {
    let kind: MetricKind = mtype.parse().map_err(|_| StorageError::Corrupt {
        id: id.clone(),
        reason: format!("unknown type {mtype:?}"),
    })?;
    let value = match (kind, delta, mvalue) {
        (MetricKind::Counter, Some(d), _) => MetricValue::Counter(d),
        (MetricKind::Gauge, _, Some(v)) => MetricValue::Gauge(v),
        (kind, _, _) => {
            return Err(StorageError::Corrupt {
                id,
                reason: format!("{kind} row without its value column"),
            })
        }
    };
    Ok(Metric::new(id, value))
}

impl SnapshotStore for SqliteSnapshotStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn load(&self) -> Result<Vec<Metric>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare("SELECT id, mtype, delta, mvalue FROM metrics ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, Option<f64>>(3)?,
            ))
        })?;

        let mut metrics = Vec::new();
        for row in rows {
            let (id, mtype, delta, mvalue) = row?;
            metrics.push(row_to_metric(id, mtype, delta, mvalue)?);
        }
        Ok(metrics)
    }

    fn save(&self, snapshot: &[Metric]) -> Result<()> {
        self.retry
            .run_blocking(|_| self.write_all(snapshot), is_transient)
            .map_err(|e| match e {
                RetryError::Exhausted { attempts, last } => StorageError::Persistence {
                    attempts,
                    last: Box::new(last),
                },
                RetryError::Permanent(e) => e,
                RetryError::Cancelled { attempts } => {
                    StorageError::Task(format!("save cancelled after {attempts} attempts"))
                }
            })
    }

    fn ping(&self) -> Result<()> {
        let conn = self.lock_conn();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;

    #[test]
    fn busy_and_locked_are_transient() {
        let busy = StorageError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_BUSY),
            None,
        ));
        let locked = StorageError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_LOCKED),
            None,
        ));
        let constraint = StorageError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_CONSTRAINT),
            None,
        ));
        assert!(is_transient(&busy));
        assert!(is_transient(&locked));
        assert!(!is_transient(&constraint));
        assert!(!is_transient(&StorageError::Task("x".into())));
    }

    #[test]
    fn row_without_value_is_corrupt() {
        let err = row_to_metric("Req".into(), "counter".into(), None, Some(1.0)).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
        let err = row_to_metric("Req".into(), "summary".into(), Some(1), None).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }
}
