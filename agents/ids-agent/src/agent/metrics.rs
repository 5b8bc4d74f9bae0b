//! System Metrics
//!
//! Sources of CPU/RAM samples for the resource supervisor.

use sysinfo::System;
use thiserror::Error;

use crate::agent::throttle::ResourceSample;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("total memory reported as zero")]
    NoMemoryInfo,

    #[error("metrics unavailable: {0}")]
    Unavailable(String),
}

/// Something that can take an instantaneous resource sample.
/// Implementations must not block.
pub trait MetricsSource: Send {
    fn sample(&mut self) -> Result<ResourceSample, MetricsError>;
}

/// Host metrics read through `sysinfo`
pub struct SystemMetrics {
    system: System,
}

impl SystemMetrics {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between two refreshes; prime the first one.
        system.refresh_cpu_usage();
        Self { system }
    }
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for SystemMetrics {
    fn sample(&mut self) -> Result<ResourceSample, MetricsError> {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let total = self.system.total_memory();
        if total == 0 {
            return Err(MetricsError::NoMemoryInfo);
        }

        let cpu_percent = self.system.global_cpu_usage() as f64;
        let ram_percent = self.system.used_memory() as f64 / total as f64 * 100.0;

        Ok(ResourceSample::now(cpu_percent, ram_percent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_sample_in_range() {
        let mut metrics = SystemMetrics::new();
        if let Ok(sample) = metrics.sample() {
            assert!((0.0..=100.0).contains(&sample.cpu_percent));
            assert!((0.0..=100.0).contains(&sample.ram_percent));
        }
    }
}
