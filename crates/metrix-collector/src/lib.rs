//! Host and runtime sampling for the metrix agent.
//!
//! Each [`Collector`] reads one category of statistics (runtime, process,
//! CPU, memory, load) and returns them as gauge [`Observation`]s. The
//! [`Sampler`] drives every registered collector once per poll interval and
//! merges the results into a shared [`MetricStore`].

pub mod cpu;
pub mod load;
pub mod memory;
pub mod process;
pub mod runtime;

use anyhow::Result;
use metrix_common::{MetricStore, MetricValue};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Counter incremented once per completed sampling pass.
pub const POLL_COUNT: &str = "PollCount";

/// One named gauge reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub name: String,
    pub value: f64,
}

impl Observation {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A source of host or runtime statistics.
///
/// Implementations are registered with a [`Sampler`] and called on every
/// poll tick. The trait requires `Send` so the sampler can run as its own
/// task.
pub trait Collector: Send {
    /// Returns the collector name (e.g., `"cpu"`), used for logging.
    fn name(&self) -> &str;

    /// Reads current values.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system API call fails.
    fn collect(&mut self) -> Result<Vec<Observation>>;
}

/// The default collector set: runtime, CPU, memory and load.
pub fn default_collectors() -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(runtime::RuntimeCollector::new()),
        Box::new(process::ProcessCollector::new()),
        Box::new(cpu::CpuCollector::new()),
        Box::new(memory::MemoryCollector::new()),
        Box::new(load::LoadCollector::new()),
    ]
}

pub struct Sampler {
    store: Arc<MetricStore>,
    collectors: Vec<Box<dyn Collector>>,
    poll_interval: Duration,
}

impl Sampler {
    pub fn new(
        store: Arc<MetricStore>,
        collectors: Vec<Box<dyn Collector>>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            collectors,
            poll_interval,
        }
    }

    /// One sampling pass. Failures are logged and skipped, never fatal.
    ///
    /// Returns how many statistics were recorded, not counting `PollCount`.
    pub fn poll(&mut self) -> usize {
        let mut recorded = 0;
        for collector in &mut self.collectors {
            let observations = match collector.collect() {
                Ok(obs) => obs,
                Err(e) => {
                    tracing::warn!(collector = collector.name(), error = %e, "Collection failed");
                    continue;
                }
            };
            for obs in observations {
                match self.store.observe(&obs.name, MetricValue::Gauge(obs.value)) {
                    Ok(_) => recorded += 1,
                    Err(e) => {
                        tracing::warn!(collector = collector.name(), metric = %obs.name, error = %e, "Rejected observation")
                    }
                }
            }
        }
        if let Err(e) = self.store.observe(POLL_COUNT, MetricValue::Counter(1)) {
            tracing::warn!(error = %e, "Failed to bump PollCount");
        }
        tracing::debug!(recorded, "Sampling pass complete");
        recorded
    }

    /// Poll on every tick until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut tick = interval(self.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_ms = self.poll_interval.as_millis() as u64, collectors = self.collectors.len(), "Starting sampling loop");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Sampling loop stopped");
                    break;
                }
                _ = tick.tick() => {
                    self.poll();
                }
            }
        }
    }
}
