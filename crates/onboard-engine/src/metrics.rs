//! Repair metrics.
//!
//! Detached compensations report nothing back to the caller. Their only
//! observable effects are a log line and these counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Snapshot of repair metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Compensations handed to a detached task.
    pub compensations_dispatched: u64,
    /// Compensations that healed the divergence.
    pub repaired: u64,
    /// Compensations that gave up, leaving a standing inconsistency.
    pub irreparable: u64,
    /// Retries performed by any retry policy execution.
    pub retries_total: u64,
    /// Primary (caller-facing) calls that failed after the retry policy gave up.
    pub primary_failures: u64,
}

impl MetricsSnapshot {
    /// Compensations that reached a terminal outcome.
    pub fn settled(&self) -> u64 {
        self.repaired + self.irreparable
    }

    /// Compensations still running.
    pub fn in_flight(&self) -> u64 {
        self.compensations_dispatched.saturating_sub(self.settled())
    }
}

/// Thread-safe repair counters, shared by the dispatcher and the compensation engine.
#[derive(Debug, Default)]
pub struct RepairMetrics {
    compensations_dispatched: AtomicU64,
    repaired: AtomicU64,
    irreparable: AtomicU64,
    retries_total: AtomicU64,
    primary_failures: AtomicU64,
}

impl RepairMetrics {
    /// Creates a new instance with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a compensation handed to a detached task.
    pub fn record_dispatched(&self) {
        self.compensations_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful compensation.
    pub fn record_repaired(&self) {
        self.repaired.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a compensation that gave up.
    pub fn record_irreparable(&self) {
        self.irreparable.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one retry.
    pub fn record_retry(&self) {
        self.retries_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a caller-facing failure after retries.
    pub fn record_primary_failure(&self) {
        self.primary_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            compensations_dispatched: self.compensations_dispatched.load(Ordering::Relaxed),
            repaired: self.repaired.load(Ordering::Relaxed),
            irreparable: self.irreparable.load(Ordering::Relaxed),
            retries_total: self.retries_total.load(Ordering::Relaxed),
            primary_failures: self.primary_failures.load(Ordering::Relaxed),
        }
    }

    /// Wait until every dispatched compensation has settled, or `timeout` elapses.
    ///
    /// Returns whether nothing is left in flight.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.snapshot().in_flight() == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Render counters in Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let snap = self.snapshot();
        let rows = [
            ("onboard_compensations_dispatched_total", "Compensations dispatched", snap.compensations_dispatched),
            ("onboard_compensations_repaired_total", "Compensations that healed a divergence", snap.repaired),
            ("onboard_compensations_irreparable_total", "Standing inconsistencies left for an operator", snap.irreparable),
            ("onboard_retries_total", "Retries performed", snap.retries_total),
            ("onboard_primary_failures_total", "Caller-facing failures after retries", snap.primary_failures),
        ];
        let mut out = String::new();
        for (name, help, value) in rows {
            out.push_str(&format!("# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"));
        }
        out
    }
}
