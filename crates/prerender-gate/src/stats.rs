//! Atomic render statistics counters.
//!
//! Lock-free counters for tracking how requests move through the gate.
//! All atomics use `Relaxed` ordering; these are monotonic display counters
//! with no synchronization requirements.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

#[derive(Default)]
struct StatsInner {
    requests: AtomicU64,
    eligible: AtomicU64,
    cache_hits: AtomicU64,
    served: AtomicU64,
    cancelled: AtomicU64,
    render_errors: AtomicU64,
    shadow_completed: AtomicU64,
    shadow_failed: AtomicU64,
    shadow_dropped: AtomicU64,
}

/// Thread-safe atomic render statistics. Cheap to clone (Arc).
#[derive(Clone, Default)]
pub struct RenderStats {
    inner: Arc<StatsInner>,
}

/// Snapshot of current stats values, serializable to JSON.
#[derive(Debug, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub eligible: u64,
    pub cache_hits: u64,
    pub served: u64,
    pub cancelled: u64,
    pub render_errors: u64,
    pub shadow_completed: u64,
    pub shadow_failed: u64,
    pub shadow_dropped: u64,
}

impl RenderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_requests(&self) {
        self.inner.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_eligible(&self) {
        self.inner.eligible.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_hits(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_served(&self) {
        self.inner.served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cancelled(&self) {
        self.inner.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_render_errors(&self) {
        self.inner.render_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_shadow_completed(&self) {
        self.inner.shadow_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_shadow_failed(&self) {
        self.inner.shadow_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_shadow_dropped(&self) {
        self.inner.shadow_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            requests: load(&self.inner.requests),
            eligible: load(&self.inner.eligible),
            cache_hits: load(&self.inner.cache_hits),
            served: load(&self.inner.served),
            cancelled: load(&self.inner.cancelled),
            render_errors: load(&self.inner.render_errors),
            shadow_completed: load(&self.inner.shadow_completed),
            shadow_failed: load(&self.inner.shadow_failed),
            shadow_dropped: load(&self.inner.shadow_dropped),
        }
    }
}
