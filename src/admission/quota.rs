//! Per-key daily request counters

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Requests counted today, per API key.
///
/// Each key's count is an atomic bumped under the shard's shared lock, so
/// increments on different keys never wait on each other and concurrent
/// increments on one key never lose an update. Counters are created on
/// first use and dropped in bulk by [`DailyQuotaCounter::reset_all`].
#[derive(Debug, Default)]
pub struct DailyQuotaCounter {
    counts: DashMap<String, AtomicU64>,
}

impl DailyQuotaCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more request for `api_key` and return the new total
    pub fn increment_and_get(&self, api_key: &str) -> u64 {
        if let Some(count) = self.counts.get(api_key) {
            return count.fetch_add(1, Ordering::AcqRel) + 1;
        }

        // First request today: the entry lock makes creation race-free
        self.counts
            .entry(api_key.to_owned())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::AcqRel)
            + 1
    }

    /// Today's count for `api_key` (0 if unseen)
    pub fn get_count(&self, api_key: &str) -> u64 {
        self.counts
            .get(api_key)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Forget every key's count
    pub fn reset_all(&self) {
        let keys = self.counts.len();
        self.counts.clear();
        info!(keys, "Daily quota counters reset");
    }

    /// Number of keys counted since the last reset
    pub fn tracked_keys(&self) -> usize {
        self.counts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_increment_starts_at_one() {
        let counter = DailyQuotaCounter::new();
        assert_eq!(counter.get_count("k"), 0);
        assert_eq!(counter.increment_and_get("k"), 1);
        assert_eq!(counter.increment_and_get("k"), 2);
        assert_eq!(counter.get_count("k"), 2);
        assert_eq!(counter.get_count("other"), 0);
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let counter = DailyQuotaCounter::new();
        counter.increment_and_get("key");
        assert_eq!(counter.increment_and_get("KEY"), 1);
    }

    #[test]
    fn test_reset_then_increment_returns_one() {
        let counter = DailyQuotaCounter::new();
        for _ in 0..42 {
            counter.increment_and_get("a");
        }
        counter.increment_and_get("b");

        counter.reset_all();

        assert_eq!(counter.tracked_keys(), 0);
        assert_eq!(counter.increment_and_get("a"), 1);
        assert_eq!(counter.increment_and_get("b"), 1);
        assert_eq!(counter.increment_and_get("never-seen"), 1);
    }

    #[test]
    fn test_concurrent_increments_across_keys() {
        let counter = Arc::new(DailyQuotaCounter::new());

        std::thread::scope(|s| {
            for t in 0..8 {
                let counter = &counter;
                s.spawn(move || {
                    for i in 0..100 {
                        counter.increment_and_get(&format!("key-{}", (t + i) % 16));
                    }
                });
            }
        });

        assert_eq!(counter.tracked_keys(), 16);
        let total: u64 = (0..16).map(|k| counter.get_count(&format!("key-{k}"))).sum();
        assert_eq!(total, 800);
    }

    #[test]
    fn test_concurrent_increments_are_linearizable() {
        const THREADS: u64 = 8;
        const PER_THREAD: u64 = 250;

        let counter = Arc::new(DailyQuotaCounter::new());

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    (0..PER_THREAD)
                        .map(|_| counter.increment_and_get("shared"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        seen.sort_unstable();

        let expected: Vec<u64> = (1..=THREADS * PER_THREAD).collect();
        assert_eq!(seen, expected);
    }
}
