use crate::{Collector, Observation};
use anyhow::Result;
use sysinfo::System;

/// Physical memory and swap, in bytes.
pub struct MemoryCollector {
    system: System,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MemoryCollector {
    fn name(&self) -> &str {
        "memory"
    }

    fn collect(&mut self) -> Result<Vec<Observation>> {
        self.system.refresh_memory();

        Ok(vec![
            Observation::new("TotalMemory", self.system.total_memory() as f64),
            Observation::new("FreeMemory", self.system.free_memory() as f64),
            Observation::new("UsedMemory", self.system.used_memory() as f64),
            Observation::new("AvailableMemory", self.system.available_memory() as f64),
            Observation::new("TotalSwap", self.system.total_swap() as f64),
            Observation::new("UsedSwap", self.system.used_swap() as f64),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_six_memory_gauges() {
        let points = MemoryCollector::new().collect().unwrap();
        let names: Vec<_> = points.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            ["TotalMemory", "FreeMemory", "UsedMemory", "AvailableMemory", "TotalSwap", "UsedSwap"]
        );
    }
}
