//! Worker-side counters.
//!
//! Workers record one sample per finished attempt; [`QueueStats`] joins those
//! counters with the live queue sizes at read time.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counters {
    processed: u64,
    succeeded: u64,
    failed: u64,
    total_duration_ms: u128,
}

impl Counters {
    fn merge(&mut self, other: &Counters) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.total_duration_ms += other.total_duration_ms;
    }

    fn avg_duration_ms(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.processed as f64
        }
    }
}

/// Snapshot returned by `Engine::stats`.
///
/// `queue` is `None` for the all-queues view. `failed_total` counts failed
/// attempts, including the ones that were retried afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue: Option<String>,
    pub size: usize,
    pub scheduled: usize,
    pub processed_total: u64,
    pub succeeded_total: u64,
    pub failed_total: u64,
    pub avg_duration_ms: f64,
}

#[derive(Debug, Default)]
pub struct StatsAggregator {
    per_queue: Mutex<HashMap<String, Counters>>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished attempt.
    pub fn record(&self, queue: &str, succeeded: bool, elapsed: Duration) {
        let mut per_queue = self.per_queue.lock().unwrap_or_else(|e| e.into_inner());
        let counters = per_queue.entry(queue.to_string()).or_default();
        counters.processed += 1;
        if succeeded {
            counters.succeeded += 1;
        } else {
            counters.failed += 1;
        }
        counters.total_duration_ms += elapsed.as_millis();
    }

    /// Counters for one queue, or summed over all queues.
    pub fn snapshot(&self, queue: Option<&str>, size: usize, scheduled: usize) -> QueueStats {
        let per_queue = self.per_queue.lock().unwrap_or_else(|e| e.into_inner());
        let mut total = Counters::default();
        match queue {
            Some(q) => {
                if let Some(c) = per_queue.get(q) {
                    total.merge(c);
                }
            }
            None => per_queue.values().for_each(|c| total.merge(c)),
        }
        QueueStats {
            queue: queue.map(String::from),
            size,
            scheduled,
            processed_total: total.processed,
            succeeded_total: total.succeeded,
            failed_total: total.failed,
            avg_duration_ms: total.avg_duration_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_aggregator_reports_zeroes() {
        let stats = StatsAggregator::new().snapshot(Some("default"), 3, 1);
        assert_eq!(stats.size, 3);
        assert_eq!(stats.scheduled, 1);
        assert_eq!(stats.processed_total, 0);
        assert_eq!(stats.avg_duration_ms, 0.0);
    }

    #[test]
    fn per_queue_and_global_views() {
        let agg = StatsAggregator::new();
        agg.record("mail", true, Duration::from_millis(10));
        agg.record("mail", false, Duration::from_millis(30));
        agg.record("reports", true, Duration::from_millis(50));

        let mail = agg.snapshot(Some("mail"), 0, 0);
        assert_eq!(mail.processed_total, 2);
        assert_eq!(mail.succeeded_total, 1);
        assert_eq!(mail.failed_total, 1);
        assert_eq!(mail.avg_duration_ms, 20.0);

        let all = agg.snapshot(None, 0, 0);
        assert_eq!(all.queue, None);
        assert_eq!(all.processed_total, 3);
        assert_eq!(all.avg_duration_ms, 30.0);
    }
}
