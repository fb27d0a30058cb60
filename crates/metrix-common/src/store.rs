use crate::error::{MetricError, Result};
use crate::types::{Metric, MetricKind, MetricRequest, MetricValue};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    metrics: Vec<Metric>,
    index: HashMap<String, usize>,
}

impl Inner {
    fn upsert(&mut self, metric: Metric) -> &Metric {
        match self.index.get(metric.id()) {
            Some(&pos) => {
                self.metrics[pos] = metric;
                &self.metrics[pos]
            }
            None => {
                let pos = self.metrics.len();
                self.index.insert(metric.id().to_string(), pos);
                self.metrics.push(metric);
                &self.metrics[pos]
            }
        }
    }

    fn get(&self, id: &str) -> Option<&Metric> {
        self.index.get(id).map(|&pos| &self.metrics[pos])
    }
}

/// Insertion-ordered metric collection keyed by id.
///
/// Counters accumulate, gauges overwrite. A single mutex serializes every
/// mutation and every snapshot read, so value and text never tear.
///
/// # Examples
///
/// ```rust
/// use metrix_common::{MetricKind, MetricStore};
///
/// let store = MetricStore::new();
/// store.collect("Req", "counter", "5").unwrap();
/// let m = store.collect("Req", "counter", "10").unwrap();
/// assert_eq!(m.counter_value(), Some(15));
/// assert_eq!(store.get_typed("Req", "counter").unwrap().text_value(), "15");
/// assert!(store.get_typed("Req", MetricKind::Gauge.as_str()).is_err());
/// ```
#[derive(Default)]
pub struct MetricStore {
    inner: Mutex<Inner>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated from a snapshot.
    pub fn from_snapshot(snapshot: Vec<Metric>) -> Self {
        let store = Self::new();
        store.restore(snapshot);
        store
    }

    /// Lock the metric map, recovering from a poisoned Mutex if necessary.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or replace in place. Position of an existing id is preserved.
    pub fn upsert(&self, metric: Metric) {
        self.lock().upsert(metric);
    }

    /// Validate a raw observation and merge it into the store.
    ///
    /// Returns the updated metric. On any error the store is left unchanged.
    pub fn collect(&self, id: &str, kind: &str, raw_value: &str) -> Result<Metric> {
        if id.is_empty() {
            return Err(MetricError::BadRequest("metric id is empty".to_string()));
        }
        let kind: MetricKind = kind.parse()?;
        let raw = raw_value.trim();

        match kind {
            MetricKind::Counter => {
                let delta: i64 = raw.parse().map_err(|_| {
                    MetricError::BadRequest(format!("counter {id}: {raw_value:?} is not an integer"))
                })?;
                if delta < 0 {
                    return Err(MetricError::BadRequest(format!(
                        "counter {id}: negative delta {delta}"
                    )));
                }
                let mut inner = self.lock();
                let base = inner.get(id).and_then(Metric::counter_value).unwrap_or(0);
                let total = base.checked_add(delta).ok_or_else(|| {
                    MetricError::BadRequest(format!("counter {id}: {base} + {delta} overflows"))
                })?;
                Ok(inner.upsert(Metric::counter(id, total)).clone())
            }
            MetricKind::Gauge => {
                let value: f64 = raw.parse().map_err(|_| {
                    MetricError::BadRequest(format!("gauge {id}: {raw_value:?} is not a number"))
                })?;
                if !value.is_finite() {
                    return Err(MetricError::BadRequest(format!(
                        "gauge {id}: {value} is not finite"
                    )));
                }
                Ok(self.lock().upsert(Metric::gauge(id, value)).clone())
            }
        }
    }

    /// Wire-level entry point for one ingest record.
    pub fn apply(&self, request: &MetricRequest) -> Result<Metric> {
        let raw = request.raw_value()?;
        self.collect(&request.id, &request.kind, &raw)
    }

    /// Record an observation that is already typed, as the sampler does.
    pub fn observe(&self, id: &str, value: MetricValue) -> Result<Metric> {
        match value {
            MetricValue::Counter(v) => self.collect(id, "counter", &v.to_string()),
            MetricValue::Gauge(v) => self.collect(id, "gauge", &v.to_string()),
        }
    }

    pub fn get(&self, id: &str) -> Result<Metric> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| MetricError::NotFound(id.to_string()))
    }

    /// Lookup used by retrieval endpoints. A kind mismatch reads as absent.
    pub fn get_typed(&self, id: &str, kind: &str) -> Result<Metric> {
        let kind: MetricKind = kind.parse()?;
        match self.lock().get(id) {
            Some(metric) if metric.kind() == kind => Ok(metric.clone()),
            _ => Err(MetricError::NotFound(format!("{kind} {id}"))),
        }
    }

    /// Every stored id, once, in insertion order.
    pub fn list(&self) -> Vec<String> {
        self.lock()
            .metrics
            .iter()
            .map(|m| m.id().to_string())
            .collect()
    }

    /// Consistent copy of all metrics, taken under the lock.
    pub fn snapshot(&self) -> Vec<Metric> {
        self.lock().metrics.clone()
    }

    pub fn restore(&self, snapshot: Vec<Metric>) {
        let mut inner = self.lock();
        for metric in snapshot {
            inner.upsert(metric);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
