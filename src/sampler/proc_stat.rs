//! CPU utilization from the aggregate `cpu` line of `/proc/stat`.

use std::path::PathBuf;

use super::{CpuSource, SampleError};

const PROC_STAT: &str = "/proc/stat";

/// Cumulative jiffy counters from one read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CpuTimes {
    /// Sum of all states.
    total: u64,
    /// idle + iowait.
    idle: u64,
}

impl CpuTimes {
    /// Busy fraction between `prev` and `self`, or `None` if no time passed.
    #[allow(clippy::cast_precision_loss)]
    fn busy_since(&self, prev: &CpuTimes) -> Option<f64> {
        let total_delta = self.total.saturating_sub(prev.total);
        if total_delta == 0 {
            return None;
        }
        let idle_delta = self.idle.saturating_sub(prev.idle).min(total_delta);
        Some(1.0 - idle_delta as f64 / total_delta as f64)
    }
}

/// Reads `/proc/stat` and reports utilization between consecutive reads.
#[derive(Debug)]
pub struct ProcStatSource {
    path: PathBuf,
    last_times: Option<CpuTimes>,
}

impl ProcStatSource {
    pub fn new() -> Self {
        Self::with_path(PROC_STAT)
    }

    /// Read from an alternate file with the same format.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_times: None,
        }
    }

    fn read_times(&self) -> Result<CpuTimes, SampleError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| SampleError::Read {
            path: self.path.display().to_string(),
            source: e,
        })?;
        parse_cpu_line(&content)
    }
}

impl Default for ProcStatSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuSource for ProcStatSource {
    fn busy_fraction(&mut self) -> Result<Option<f64>, SampleError> {
        let current = self.read_times()?;
        let busy = self
            .last_times
            .as_ref()
            .and_then(|prev| current.busy_since(prev));
        self.last_times = Some(current);
        Ok(busy)
    }
}

/// Parse the aggregate `cpu ` line.
///
/// Format: `cpu user nice system idle iowait irq softirq steal [guest guest_nice]`.
/// guest time is already counted in user, so only the first eight fields are summed.
fn parse_cpu_line(content: &str) -> Result<CpuTimes, SampleError> {
    let line = content
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| SampleError::Malformed("no aggregate cpu line".to_string()))?;

    let fields = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .map(str::parse::<u64>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SampleError::Malformed(format!("{e}: {line}")))?;

    if fields.len() < 4 {
        return Err(SampleError::Malformed(format!("too few fields: {line}")));
    }

    let iowait = fields.get(4).copied().unwrap_or(0);
    Ok(CpuTimes {
        total: fields.iter().sum(),
        idle: fields[3] + iowait,
    })
}
