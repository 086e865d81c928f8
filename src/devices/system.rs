//! Host core utilisation via `sysinfo`

use crate::drivers::CoreUtilization;
use crate::error::{Error, Result};
use sysinfo::System;

/// Per-core CPU usage of the machine the bridge runs on.
///
/// Usage is computed between consecutive refreshes, so the first reading
/// after construction may be zero.
pub struct SystemCores {
    system: System,
}

impl SystemCores {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self { system }
    }
}

impl Default for SystemCores {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreUtilization for SystemCores {
    fn read_utilization(&mut self) -> Result<Vec<f32>> {
        self.system.refresh_cpu_usage();
        let usage: Vec<f32> = self.system.cpus().iter().map(|cpu| cpu.cpu_usage()).collect();

        if usage.is_empty() {
            return Err(Error::SensorRead {
                source_name: "cores",
                reason: "no CPUs reported".to_string(),
            });
        }
        Ok(usage)
    }
}
