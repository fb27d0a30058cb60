use crate::{Collector, Observation};
use anyhow::{anyhow, Result};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Memory and CPU of the agent process itself.
///
/// Emits `ProcessResidentMemory` and `ProcessVirtualMemory` in bytes and
/// `ProcessCPUutilization` in percent.
pub struct ProcessCollector {
    system: System,
    pid: Option<Pid>,
}

impl ProcessCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for ProcessCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for ProcessCollector {
    fn name(&self) -> &str {
        "process"
    }

    fn collect(&mut self) -> Result<Vec<Observation>> {
        let pid = self
            .pid
            .ok_or_else(|| anyhow!("current process id is unavailable"))?;
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::new().with_memory().with_cpu(),
        );
        let process = self
            .system
            .process(pid)
            .ok_or_else(|| anyhow!("process {pid} not found"))?;

        Ok(vec![
            Observation::new("ProcessResidentMemory", process.memory() as f64),
            Observation::new("ProcessVirtualMemory", process.virtual_memory() as f64),
            Observation::new("ProcessCPUutilization", process.cpu_usage() as f64),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_own_memory() {
        let points = ProcessCollector::new().collect().unwrap();
        let names: Vec<_> = points.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            ["ProcessResidentMemory", "ProcessVirtualMemory", "ProcessCPUutilization"]
        );
        assert!(points[0].value > 0.0);
        assert!(points[1].value >= points[0].value);
    }

    #[test]
    fn missing_pid_is_an_error() {
        let mut collector = ProcessCollector {
            system: System::new(),
            pid: None,
        };
        assert!(collector.collect().is_err());
    }
}
