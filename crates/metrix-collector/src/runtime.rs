use crate::{Collector, Observation};
use anyhow::Result;
use rand::Rng;
use tokio::runtime::Handle;

/// Async runtime statistics plus a `RandomValue` gauge.
///
/// Runtime gauges are only emitted when called from inside a tokio runtime.
pub struct RuntimeCollector;

impl RuntimeCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RuntimeCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for RuntimeCollector {
    fn name(&self) -> &str {
        "runtime"
    }

    fn collect(&mut self) -> Result<Vec<Observation>> {
        let mut points = Vec::with_capacity(3);

        if let Ok(handle) = Handle::try_current() {
            let metrics = handle.metrics();
            points.push(Observation::new("RuntimeWorkers", metrics.num_workers() as f64));
            points.push(Observation::new("RuntimeAliveTasks", metrics.num_alive_tasks() as f64));
        }
        points.push(Observation::new("RandomValue", rand::thread_rng().gen::<f64>()));

        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outside_runtime_only_random_value() {
        let points = RuntimeCollector::new().collect().unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].name, "RandomValue");
        assert!((0.0..1.0).contains(&points[0].value));
    }

    #[tokio::test]
    async fn inside_runtime_reports_workers() {
        let points = RuntimeCollector::new().collect().unwrap();
        let workers = points.iter().find(|p| p.name == "RuntimeWorkers").unwrap();
        assert!(workers.value >= 1.0);
    }
}
