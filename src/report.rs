//! Run and memory accounting
//!
//! All figures here are transient diagnostic output: computed, printed,
//! discarded. "Allocated" is the exact byte count of the tensors the
//! session keeps live; "reserved" is what the driver says the device
//! gained in used memory over the run, which includes allocator block
//! overhead and is a superset of allocated.

use crate::probe::MemorySnapshot;

/// Bytes as decimal gigabytes, matching the driver-tool convention
pub fn gb(bytes: u64) -> f64 {
    bytes as f64 / 1e9
}

/// Device memory summary for the completed run
#[derive(Debug, Clone, Copy)]
pub struct MemoryReport {
    /// Bytes of live training tensors (parameters, gradients, moments)
    pub allocated: u64,
    /// Driver-level used-memory growth since the probe baseline
    pub reserved: u64,
}

impl MemoryReport {
    /// Build the report from the baseline and final snapshots
    pub fn new(baseline: MemorySnapshot, end: MemorySnapshot, allocated: u64) -> Self {
        Self { allocated, reserved: end.used.saturating_sub(baseline.used) }
    }

    /// Emit the memory section of the diagnostic output
    pub fn log(&self) {
        tracing::info!("GPU memory:");
        tracing::info!("  Allocated: {:.2} GB", gb(self.allocated));
        tracing::info!("  Reserved:  {:.2} GB", gb(self.reserved));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(used: u64) -> MemorySnapshot {
        MemorySnapshot { used, total: 8_000_000_000 }
    }

    #[test]
    fn test_gb() {
        assert!((gb(2_000_000_000) - 2.0).abs() < 1e-9);
        assert_eq!(gb(0), 0.0);
    }

    #[test]
    fn test_reserved_is_used_delta() {
        let report = MemoryReport::new(snap(500_000_000), snap(2_000_000_000), 10_540_768);
        assert_eq!(report.reserved, 1_500_000_000);
    }

    #[test]
    fn test_allocated_within_reserved() {
        // The caching allocator reserves whole blocks, so the tracked
        // tensor bytes never exceed the driver-level growth.
        let report = MemoryReport::new(snap(500_000_000), snap(600_000_000), 10_540_768);
        assert!(report.allocated <= report.reserved);
    }

    #[test]
    fn test_reserved_saturates_when_memory_was_freed() {
        // Another process releasing memory mid-run must not underflow.
        let report = MemoryReport::new(snap(2_000_000_000), snap(1_000_000_000), 1024);
        assert_eq!(report.reserved, 0);
    }
}
