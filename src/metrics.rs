//! Cache metrics.
//!
//! The engine mirrors its externally visible activity to a [`MetricsSink`]:
//! one hit counter, one miss counter (history hits and decompression
//! failures count as misses), and a signed running delta of resident
//! payload bytes. Internal counters (`objects`, `history`) are not
//! exported.
//!
//! Sinks are shared (`Arc<dyn MetricsSink>`) and invoked while the caller
//! holds the volume mutex, but must themselves be thread-safe so snapshots
//! can be read from other threads. [`AtomicMetrics`] is the default
//! implementation.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Destination for cache counters.
pub trait MetricsSink: Send + Sync {
    /// One resident hit.
    fn record_hit(&self);
    /// One miss (not found, history hit, or decompression failure).
    fn record_miss(&self);
    /// Signed change in resident payload bytes.
    fn add_bytes(&self, delta: i64);
}

/// Lock-free [`MetricsSink`] backed by atomics.
///
/// # Example
///
/// ```
/// use clfus::metrics::{AtomicMetrics, MetricsSink};
///
/// let metrics = AtomicMetrics::new();
/// metrics.record_hit();
/// metrics.record_miss();
/// metrics.add_bytes(1000);
/// metrics.add_bytes(-400);
///
/// let snap = metrics.snapshot();
/// assert_eq!(snap.hits, 1);
/// assert_eq!(snap.misses, 1);
/// assert_eq!(snap.bytes, 600);
/// ```
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    bytes: AtomicI64,
}

impl AtomicMetrics {
    /// Creates a zeroed metrics block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSink for AtomicMetrics {
    #[inline]
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn add_bytes(&self, delta: i64) {
        self.bytes.fetch_add(delta, Ordering::Relaxed);
    }
}

/// Point-in-time counter values from an [`AtomicMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Resident hits.
    pub hits: u64,
    /// Misses, including history hits and decompression failures.
    pub misses: u64,
    /// Net resident payload bytes (signed running sum of deltas).
    pub bytes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let m = AtomicMetrics::new();
        for _ in 0..3 {
            m.record_hit();
        }
        m.record_miss();
        m.add_bytes(500);
        m.add_bytes(-200);

        let snap = m.snapshot();
        assert_eq!(snap.hits, 3);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.bytes, 300);
    }

    #[test]
    fn bytes_delta_may_go_negative() {
        let m = AtomicMetrics::new();
        m.add_bytes(-100);
        assert_eq!(m.snapshot().bytes, -100);
    }

    #[test]
    fn sink_is_shareable_across_threads() {
        let m = Arc::new(AtomicMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = Arc::clone(&m);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        m.record_hit();
                        m.add_bytes(1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = m.snapshot();
        assert_eq!(snap.hits, 4000);
        assert_eq!(snap.bytes, 4000);
    }
}
