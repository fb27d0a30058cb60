use crate::delivery::{DeliveryClient, DeliveryError};
use crate::gate::ConcurrencyGate;
use metrix_common::MetricStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Per-sweep delivery tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub delivered: usize,
    pub failed: usize,
    /// Metrics not attempted because cancellation fired first.
    pub skipped: usize,
}

#[derive(Debug)]
pub enum SweepOutcome {
    /// The gate was full (or shutdown began); this cycle is dropped.
    Skipped,
    Started(JoinHandle<SweepReport>),
}

/// Periodically snapshots the store and delivers every metric, with at most
/// `rate_limit` sweeps in flight.
pub struct ReportScheduler {
    store: Arc<MetricStore>,
    client: Arc<DeliveryClient>,
    gate: ConcurrencyGate,
    report_interval: Duration,
    cancel: CancellationToken,
}

impl ReportScheduler {
    pub fn new(
        store: Arc<MetricStore>,
        client: Arc<DeliveryClient>,
        rate_limit: usize,
        report_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            client,
            gate: ConcurrencyGate::new(rate_limit),
            report_interval,
            cancel,
        }
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Start one sweep if a gate slot is free. Never waits for a slot.
    pub fn try_sweep(&self) -> SweepOutcome {
        if self.cancel.is_cancelled() {
            return SweepOutcome::Skipped;
        }
        let Some(permit) = self.gate.try_enter() else {
            tracing::info!(capacity = self.gate.capacity(), "Rate limit reached, skipping report cycle");
            return SweepOutcome::Skipped;
        };

        let snapshot = self.store.snapshot();
        let client = Arc::clone(&self.client);
        let cancel = self.cancel.clone();

        SweepOutcome::Started(tokio::spawn(async move {
            let mut report = SweepReport::default();
            let mut tasks = JoinSet::new();

            for metric in snapshot {
                if cancel.is_cancelled() {
                    report.skipped += 1;
                    continue;
                }
                let client = Arc::clone(&client);
                let cancel = cancel.clone();
                tasks.spawn(async move {
                    let res = client.send(&metric, &cancel).await;
                    (metric, res)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((_, Ok(()))) => report.delivered += 1,
                    Ok((_, Err(DeliveryError::Cancelled { .. }))) => report.skipped += 1,
                    Ok((metric, Err(e))) => {
                        report.failed += 1;
                        tracing::warn!(metric = metric.id(), error = %e, "Metric delivery failed");
                    }
                    Err(e) => {
                        report.failed += 1;
                        tracing::error!(error = %e, "Delivery task panicked");
                    }
                }
            }

            tracing::debug!(delivered = report.delivered, failed = report.failed, skipped = report.skipped, "Report sweep finished");
            drop(permit);
            report
        }))
    }

    /// Fire a sweep on every report tick until cancelled, then wait for the
    /// sweeps still in flight.
    pub async fn run(&self) {
        let mut tick = interval_at(Instant::now() + self.report_interval, self.report_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.report_interval.as_secs_f64(), rate_limit = self.gate.capacity(), "Starting report loop");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tick.tick() => {
                    let _ = self.try_sweep();
                }
            }
        }

        self.gate.wait_idle().await;
        tracing::info!("Report loop stopped");
    }
}
