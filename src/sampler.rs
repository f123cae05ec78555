//! CPU idle sampling.
//!
//! An [`IdleSampler`] turns a [`CpuSource`] into one [`Reading`] per tick.
//! Read failures are transient: the previous busy fraction is reused.

mod portable;
mod proc_stat;

use std::time::Instant;

use thiserror::Error;
use tracing::{trace, warn};

use crate::config::CpuSourceKind;
use crate::domain::Reading;

pub use portable::SysinfoSource;
pub use proc_stat::ProcStatSource;

/// Busy fraction assumed until a real measurement exists.
const INITIAL_BUSY_FRACTION: f64 = 1.0;

/// Log every Nth read failure after the initial burst.
const ERROR_LOG_RATE_LIMIT: u64 = 10;
const ERROR_LOG_BURST: u64 = 5;

/// Errors that can occur while reading CPU utilization.
#[derive(Error, Debug)]
pub enum SampleError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed CPU statistics: {0}")]
    Malformed(String),

    #[error("No CPUs reported")]
    NoCpus,
}

/// Provider of instantaneous CPU utilization.
pub trait CpuSource: Send {
    /// Measure utilization since the previous call.
    ///
    /// Returns `Ok(None)` when there is not enough history yet to compute a delta.
    fn busy_fraction(&mut self) -> Result<Option<f64>, SampleError>;
}

/// Build the configured CPU source.
pub fn source_for(kind: CpuSourceKind) -> Box<dyn CpuSource> {
    match kind {
        CpuSourceKind::ProcStat => Box::new(ProcStatSource::new()),
        CpuSourceKind::Sysinfo => Box::new(SysinfoSource::new()),
    }
}

/// Produces one reading per sampling tick.
pub struct IdleSampler {
    source: Box<dyn CpuSource>,
    last_busy: f64,
    transient_errors: u64,
}

impl IdleSampler {
    pub fn new(source: Box<dyn CpuSource>) -> Self {
        Self {
            source,
            last_busy: INITIAL_BUSY_FRACTION,
            transient_errors: 0,
        }
    }

    /// Take a reading now.
    pub fn sample(&mut self) -> Reading {
        self.sample_at(Instant::now())
    }

    /// Take a reading stamped with `now`.
    pub fn sample_at(&mut self, now: Instant) -> Reading {
        match self.source.busy_fraction() {
            Ok(Some(busy)) => {
                trace!("CPU busy fraction: {:.3}", busy);
                self.last_busy = busy;
            }
            Ok(None) => {
                trace!("No CPU delta yet, reusing {:.3}", self.last_busy);
            }
            Err(e) => {
                self.transient_errors += 1;
                let count = self.transient_errors;
                if count <= ERROR_LOG_BURST || count % ERROR_LOG_RATE_LIMIT == 0 {
                    warn!(
                        "CPU sample failed ({} so far), reusing {:.3}: {}",
                        count, self.last_busy, e
                    );
                    if count == ERROR_LOG_BURST {
                        warn!("Rate-limiting sample errors (showing every {}th)", ERROR_LOG_RATE_LIMIT);
                    }
                }
            }
        }

        Reading::new(now, self.last_busy)
    }

    /// Number of failed reads since startup.
    pub fn transient_errors(&self) -> u64 {
        self.transient_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Source replaying a fixed script of results.
    struct ScriptedSource(VecDeque<Result<Option<f64>, SampleError>>);

    impl CpuSource for ScriptedSource {
        fn busy_fraction(&mut self) -> Result<Option<f64>, SampleError> {
            self.0.pop_front().unwrap_or(Ok(None))
        }
    }

    fn sampler(script: Vec<Result<Option<f64>, SampleError>>) -> IdleSampler {
        IdleSampler::new(Box::new(ScriptedSource(script.into())))
    }

    #[test]
    fn test_busy_until_first_delta() {
        let mut sampler = sampler(vec![Ok(None)]);
        let reading = sampler.sample();
        assert!((reading.busy_fraction - 1.0).abs() < f64::EPSILON);
        assert!(!reading.input_active);
    }

    #[test]
    fn test_reports_measured_fraction() {
        let mut sampler = sampler(vec![Ok(Some(0.25)), Ok(Some(0.02))]);
        assert!((sampler.sample().busy_fraction - 0.25).abs() < f64::EPSILON);
        assert!((sampler.sample().busy_fraction - 0.02).abs() < f64::EPSILON);
        assert_eq!(sampler.transient_errors(), 0);
    }

    #[test]
    fn test_read_failure_reuses_previous_value() {
        let mut sampler = sampler(vec![
            Ok(Some(0.03)),
            Err(SampleError::Malformed("truncated".to_string())),
            Err(SampleError::NoCpus),
            Ok(Some(0.6)),
        ]);

        assert!((sampler.sample().busy_fraction - 0.03).abs() < f64::EPSILON);
        assert!((sampler.sample().busy_fraction - 0.03).abs() < f64::EPSILON);
        assert!((sampler.sample().busy_fraction - 0.03).abs() < f64::EPSILON);
        assert_eq!(sampler.transient_errors(), 2);
        assert!((sampler.sample().busy_fraction - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sample_at_uses_given_timestamp() {
        let mut sampler = sampler(vec![Ok(Some(0.5))]);
        let now = Instant::now();
        assert_eq!(sampler.sample_at(now).timestamp, now);
    }
}
