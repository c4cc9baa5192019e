use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time counts for thin-execution round trips.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoundTripStats {
    /// Thin records released to the external stage.
    pub submitted: u64,
    /// Stage results matched to an original and recombined.
    pub recombined: u64,
    /// Stage results without a cached original (dropped).
    pub cache_misses: u64,
}

impl RoundTripStats {
    /// Submitted records that never came back recombined.
    ///
    /// Includes records the stage filtered out; callers needing strict
    /// accounting compare this against what the stage is allowed to drop.
    pub fn unmatched(&self) -> u64 {
        self.submitted.saturating_sub(self.recombined)
    }
}

/// Shared counters updated from inside lazily evaluated streams.
#[derive(Clone, Debug, Default)]
pub struct RoundTripCounters {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    recombined: AtomicU64,
    cache_misses: AtomicU64,
}

impl RoundTripCounters {
    /// Count a thin record released to the stage.
    pub fn record_submitted(&self) {
        self.inner.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a recombined result.
    pub fn record_recombined(&self) {
        self.inner.recombined.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a result without a cached original.
    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counts.
    pub fn snapshot(&self) -> RoundTripStats {
        RoundTripStats {
            submitted: self.inner.submitted.load(Ordering::Relaxed),
            recombined: self.inner.recombined.load(Ordering::Relaxed),
            cache_misses: self.inner.cache_misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_shared_between_clones() {
        let counters = RoundTripCounters::default();
        let clone = counters.clone();
        counters.record_submitted();
        counters.record_submitted();
        clone.record_recombined();
        clone.record_cache_miss();

        let stats = counters.snapshot();
        assert_eq!(
            stats,
            RoundTripStats {
                submitted: 2,
                recombined: 1,
                cache_misses: 1,
            }
        );
        assert_eq!(stats.unmatched(), 1);
    }
}
