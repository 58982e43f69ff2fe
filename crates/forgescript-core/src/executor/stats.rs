//! Sub-context lifecycle counters.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Snapshot of sub-context lifecycle counters.
///
/// Destruction is never awaited by callers, so `pending` can be non-zero right
/// after a request returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Sub-contexts created by the loop.
    pub created: u64,
    /// Sub-contexts destroyed successfully.
    pub destroyed: u64,
    /// Destructions that failed or could not be scheduled.
    pub destroy_failures: u64,
    /// Destructions scheduled but not yet run.
    pub pending: u64,
}

impl ExecutorStats {
    /// Sub-contexts created and not yet torn down (successfully or not).
    #[must_use]
    pub const fn live(&self) -> u64 {
        self.created
            .saturating_sub(self.destroyed)
            .saturating_sub(self.destroy_failures)
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    created: AtomicU64,
    destroyed: AtomicU64,
    destroy_failures: AtomicU64,
    pending: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn scheduled(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn destroyed(&self, ok: bool) {
        if ok {
            self.destroyed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.destroy_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn snapshot(&self) -> ExecutorStats {
        ExecutorStats {
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            destroy_failures: self.destroy_failures.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Acquire),
        }
    }
}
