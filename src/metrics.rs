use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for observing parser progress.
///
/// Every update is `Relaxed`: the parser never branches on these values -
/// they only feed snapshots inspected after the fact - so a momentarily
/// stale count is harmless and stronger ordering would buy nothing.
#[derive(Debug)]
pub struct Metrics {
    examples_parsed: AtomicU64,
    examples_read: AtomicU64,
    examples_finalized: AtomicU64,
    consumer_waits: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            examples_parsed: AtomicU64::new(0),
            examples_read: AtomicU64::new(0),
            examples_finalized: AtomicU64::new(0),
            consumer_waits: AtomicU64::new(0),
        }
    }

    /// Increment the count of examples published by the worker.
    #[inline]
    pub fn add_examples_parsed(&self, n: u64) {
        self.examples_parsed.fetch_add(n, Ordering::Relaxed);
    }

    /// Increment the count of examples handed to the consumer.
    #[inline]
    pub fn add_examples_read(&self, n: u64) {
        self.examples_read.fetch_add(n, Ordering::Relaxed);
    }

    /// Increment the count of slots released by the consumer.
    #[inline]
    pub fn add_examples_finalized(&self, n: u64) {
        self.examples_finalized.fetch_add(n, Ordering::Relaxed);
    }

    /// Increment the count of times the consumer parked waiting for a parse.
    #[inline]
    pub fn add_consumer_waits(&self, n: u64) {
        self.consumer_waits.fetch_add(n, Ordering::Relaxed);
    }

    /// Take a snapshot of current metrics values.
    ///
    /// Returns a plain struct with `u64` values that can be copied and compared.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            examples_parsed: self.examples_parsed.load(Ordering::Relaxed),
            examples_read: self.examples_read.load(Ordering::Relaxed),
            examples_finalized: self.examples_finalized.load(Ordering::Relaxed),
            consumer_waits: self.consumer_waits.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics values.
///
/// This is a plain data struct (Copy, Clone) for easy use in aggregation and display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub examples_parsed: u64,
    pub examples_read: u64,
    pub examples_finalized: u64,
    pub consumer_waits: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_tracks_counters() {
        let metrics = Metrics::new();
        metrics.add_examples_parsed(3);
        metrics.add_examples_read(2);
        metrics.add_examples_finalized(2);
        metrics.add_consumer_waits(1);

        let snap = metrics.snapshot();
        assert_eq!(snap.examples_parsed, 3);
        assert_eq!(snap.examples_read, 2);
        assert_eq!(snap.examples_finalized, 2);
        assert_eq!(snap.consumer_waits, 1);
    }
}
