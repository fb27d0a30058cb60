use crate::{Collector, Observation};
use anyhow::Result;
use sysinfo::System;

pub struct LoadCollector;

impl LoadCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoadCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for LoadCollector {
    fn name(&self) -> &str {
        "load"
    }

    fn collect(&mut self) -> Result<Vec<Observation>> {
        let load_avg = System::load_average();

        Ok(vec![
            Observation::new("LoadAverage1", load_avg.one),
            Observation::new("LoadAverage5", load_avg.five),
            Observation::new("LoadAverage15", load_avg.fifteen),
            Observation::new("Uptime", System::uptime() as f64),
        ])
    }
}
