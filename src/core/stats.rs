use std::sync::atomic::{AtomicU64, Ordering};
use serde::{Serialize, Deserialize};

/// Engine statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub scores_added: u64,
    pub scores_removed: u64,
    /// `removeScore` calls rejected because the score was not tracked
    pub remove_misses: u64,
    pub transaction_retries: u64,
    pub rank_lookups: u64,
    pub score_lookups: u64,
}

#[derive(Debug, Default)]
pub struct StatsCounters {
    pub scores_added: AtomicU64,
    pub scores_removed: AtomicU64,
    pub remove_misses: AtomicU64,
    pub transaction_retries: AtomicU64,
    pub rank_lookups: AtomicU64,
    pub score_lookups: AtomicU64,
}

impl StatsCounters {
    pub fn incr(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineStats {
        EngineStats {
            scores_added: self.scores_added.load(Ordering::Relaxed),
            scores_removed: self.scores_removed.load(Ordering::Relaxed),
            remove_misses: self.remove_misses.load(Ordering::Relaxed),
            transaction_retries: self.transaction_retries.load(Ordering::Relaxed),
            rank_lookups: self.rank_lookups.load(Ordering::Relaxed),
            score_lookups: self.score_lookups.load(Ordering::Relaxed),
        }
    }
}
