//! Running invocation statistics.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde::Serialize;

/// Point-in-time copy of a unit's statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvocationStats {
    pub total_invocations: u64,
    pub success_invocations: u64,
    pub error_invocations: u64,
    pub total_duration: Duration,
    pub average_duration: Duration,
    pub last_invocation_time: Option<SystemTime>,
}

/// Shared, lock-protected statistics record.
///
/// Clones point at the same counters, so several units or chains can report
/// into one record.
#[derive(Debug, Clone, Default)]
pub struct StatsHandle {
    inner: Arc<Mutex<InvocationStats>>,
}

impl StatsHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed invocation.
    ///
    /// Counters and the running average are updated under a single lock hold,
    /// so the average always matches the total/count pair it was derived from.
    pub fn record(&self, duration: Duration, success: bool) {
        let mut stats = self.inner.lock();
        stats.total_invocations += 1;
        stats.total_duration += duration;
        let count = u32::try_from(stats.total_invocations).unwrap_or(u32::MAX);
        stats.average_duration = stats.total_duration / count;
        stats.last_invocation_time = Some(SystemTime::now());
        if success {
            stats.success_invocations += 1;
        } else {
            stats.error_invocations += 1;
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> InvocationStats {
        self.inner.lock().clone()
    }

    /// Whether two handles share the same record.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
