//! Rolling probe statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters shared between the scheduler and readers
#[derive(Debug, Default)]
pub struct Statistics {
    total_checks: AtomicU64,
    total_latency_ms: AtomicU64,
    consecutive_failures: AtomicU64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, latency_ms: u64) {
        self.total_checks.fetch_add(1, Ordering::SeqCst);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::SeqCst);
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        self.total_checks.fetch_add(1, Ordering::SeqCst);
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_checks: self.total_checks.load(Ordering::SeqCst),
            total_latency_ms: self.total_latency_ms.load(Ordering::SeqCst),
            consecutive_failures: self.consecutive_failures.load(Ordering::SeqCst),
        }
    }

    pub fn reset(&self) {
        self.total_checks.store(0, Ordering::SeqCst);
        self.total_latency_ms.store(0, Ordering::SeqCst);
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }
}

/// Point-in-time copy of [`Statistics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_checks: u64,
    pub total_latency_ms: u64,
    pub consecutive_failures: u64,
}

impl StatsSnapshot {
    /// Latency sum over all checks, failed ones included in the divisor
    pub fn average_latency_ms(&self) -> Option<f64> {
        if self.total_checks == 0 {
            return None;
        }
        Some(self.total_latency_ms as f64 / self.total_checks as f64)
    }

    /// `(total - consecutive failures) / total * 100`
    ///
    /// Only failures since the last success are subtracted, so earlier
    /// failure streaks that ended in a success do not lower the rate.
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_checks == 0 {
            return None;
        }
        let ok = self.total_checks.saturating_sub(self.consecutive_failures);
        Some(ok as f64 / self.total_checks as f64 * 100.0)
    }
}
