//! Portable CPU utilization via `sysinfo`, for hosts without `/proc/stat`.

use ::sysinfo::System;

use super::{CpuSource, SampleError};

pub struct SysinfoSource {
    system: System,
    primed: bool,
}

impl SysinfoSource {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            primed: false,
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuSource for SysinfoSource {
    fn busy_fraction(&mut self) -> Result<Option<f64>, SampleError> {
        self.system.refresh_cpu_usage();
        if self.system.cpus().is_empty() {
            return Err(SampleError::NoCpus);
        }

        // Usage is computed between refreshes; the first one has nothing to compare to.
        if !self.primed {
            self.primed = true;
            return Ok(None);
        }

        Ok(Some(f64::from(self.system.global_cpu_usage()) / 100.0))
    }
}
