use crate::{Collector, Observation};
use anyhow::Result;
use sysinfo::System;

/// Global and per-core CPU utilization, in percent.
///
/// Emits `CPUutilization` plus `CPUutilization1..N`, one per logical core.
pub struct CpuCollector {
    system: System,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    fn collect(&mut self) -> Result<Vec<Observation>> {
        self.system.refresh_cpu_all();

        let mut points = vec![Observation::new(
            "CPUutilization",
            self.system.global_cpu_usage() as f64,
        )];
        for (i, cpu) in self.system.cpus().iter().enumerate() {
            points.push(Observation::new(
                format!("CPUutilization{}", i + 1),
                cpu.cpu_usage() as f64,
            ));
        }

        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_core_names_are_one_based() {
        let points = CpuCollector::new().collect().unwrap();
        assert_eq!(points[0].name, "CPUutilization");
        if points.len() > 1 {
            assert_eq!(points[1].name, "CPUutilization1");
        }
        assert!(points.iter().all(|p| p.value.is_finite()));
    }
}
