use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters for one component (a trustee, an orchestrator, or a guardian roster).
///
/// Counters are relaxed atomics: they are for profiling, and nothing synchronizes on them.
#[derive(Debug, Default)]
pub struct Metrics {
    exponentiations: AtomicU64,
    trustee_calls: AtomicU64,
    sessions: AtomicU64,
}

/// A point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub exponentiations: u64,
    pub trustee_calls: u64,
    pub sessions: u64,
}

impl Metrics {
    pub fn new() -> Metrics {
        Metrics::default()
    }

    pub fn add_exponentiations(&self, n: u64) {
        self.exponentiations.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_trustee_calls(&self, n: u64) {
        self.trustee_calls.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_session(&self) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            exponentiations: self.exponentiations.load(Ordering::Relaxed),
            trustee_calls: self.trustee_calls.load(Ordering::Relaxed),
            sessions: self.sessions.load(Ordering::Relaxed),
        }
    }
}

impl std::ops::Sub for MetricsSnapshot {
    type Output = MetricsSnapshot;

    /// Counts accumulated between two snapshots.
    fn sub(self, earlier: MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            exponentiations: self.exponentiations - earlier.exponentiations,
            trustee_calls: self.trustee_calls - earlier.trustee_calls,
            sessions: self.sessions - earlier.sessions,
        }
    }
}
