//! System-resource detection and screenshot pool sizing.
//!
//! All heuristics consume a plain `SystemResources` value, so tests inject
//! fixed numbers and never touch platform probes.

use std::time::Duration;

const CONSERVATIVE_MEMORY: u64 = 2 * 1024 * 1024 * 1024;

/// Estimated footprint of one headless chromium instance under load.
const MEMORY_PER_WORKER: u64 = 512 * 1024 * 1024;

/// Snapshot of the resources the screenshot pool is allowed to assume.
#[derive(Debug, Clone, Copy)]
pub struct SystemResources {
    pub cpu_count: usize,
    pub total_memory: u64,
}

impl SystemResources {
    /// Detect CPU count and total memory, falling back to conservative
    /// values when the platform query yields nothing.
    pub fn detect() -> Self {
        let mut sys = sysinfo::System::new();
        sys.refresh_memory();
        let total = sys.total_memory();

        Self {
            cpu_count: num_cpus::get().max(1),
            total_memory: if total == 0 { CONSERVATIVE_MEMORY } else { total },
        }
    }

    /// Size the screenshot worker pool.
    ///
    /// Browsers are expensive, so the pool is bounded by half the requested
    /// probe concurrency, the CPU count, how many instances fit in half the
    /// system memory, and a cap that tightens as the batch grows. Never more
    /// workers than targets, never fewer than one.
    pub fn screenshot_worker_count(&self, requested_concurrency: usize, target_count: usize) -> usize {
        let by_request = (requested_concurrency / 2).max(1);
        let by_cpu = self.cpu_count;
        let by_memory = ((self.total_memory / 2) / MEMORY_PER_WORKER).max(1) as usize;
        let by_batch = match target_count {
            0..=200 => 8,
            201..=1000 => 6,
            1001..=5000 => 4,
            _ => 2,
        };

        by_request
            .min(by_cpu)
            .min(by_memory)
            .min(by_batch)
            .min(target_count.max(1))
    }
}

/// Per-task render timeout, growing with pool concurrency to offset
/// contention: at high parallelism we favor completion over latency.
pub fn capture_timeout(workers: usize) -> Duration {
    let extra = match workers {
        0..=5 => 0,
        6..=10 => 5,
        11..=15 => 10,
        16..=20 => 15,
        21..=30 => 20,
        31..=50 => 25,
        _ => 30,
    };
    Duration::from_secs(20 + extra)
}
