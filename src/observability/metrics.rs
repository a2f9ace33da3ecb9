//! Scan metrics
//!
//! - Counters only, monotonic
//! - Passive: nothing in the scan reads them to make decisions
//! - Atomic so a session's metrics can be observed from another thread

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters of one scan session
#[derive(Debug, Default)]
pub struct ScanMetrics {
    chunks_loaded: AtomicU64,
    chunks_released: AtomicU64,
    eager_column_loads: AtomicU64,
    kernel_submits: AtomicU64,
    kernel_requeues: AtomicU64,
    kernel_completions: AtomicU64,
    cache_hits: AtomicU64,
    cache_probe_hits: AtomicU64,
    cache_gap_hits: AtomicU64,
    cache_reseeks: AtomicU64,
    rows_emitted: AtomicU64,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_chunks_loaded(&self) {
        self.chunks_loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_chunks_released(&self) {
        self.chunks_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_chunks_released(&self, n: u64) {
        self.chunks_released.fetch_add(n, Ordering::Relaxed);
    }

    pub fn increment_eager_column_loads(&self) {
        self.eager_column_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_kernel_submits(&self) {
        self.kernel_submits.fetch_add(1, Ordering::Relaxed);
    }

    /// A submission was refused and the chunk went back to pending
    pub fn increment_kernel_requeues(&self) {
        self.kernel_requeues.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_kernel_completions(&self) {
        self.kernel_completions.fetch_add(1, Ordering::Relaxed);
    }

    /// Lookup served from the current window
    pub fn increment_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Lookup served by advancing the forward cursor
    pub fn increment_cache_probe_hits(&self) {
        self.cache_probe_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Lookup answered null from the gap before the next record
    pub fn increment_cache_gap_hits(&self) {
        self.cache_gap_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_reseeks(&self) {
        self.cache_reseeks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rows_emitted(&self) {
        self.rows_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            chunks_loaded: self.chunks_loaded.load(Ordering::Relaxed),
            chunks_released: self.chunks_released.load(Ordering::Relaxed),
            eager_column_loads: self.eager_column_loads.load(Ordering::Relaxed),
            kernel_submits: self.kernel_submits.load(Ordering::Relaxed),
            kernel_requeues: self.kernel_requeues.load(Ordering::Relaxed),
            kernel_completions: self.kernel_completions.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_probe_hits: self.cache_probe_hits.load(Ordering::Relaxed),
            cache_gap_hits: self.cache_gap_hits.load(Ordering::Relaxed),
            cache_reseeks: self.cache_reseeks.load(Ordering::Relaxed),
            rows_emitted: self.rows_emitted.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of scan metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub chunks_loaded: u64,
    pub chunks_released: u64,
    pub eager_column_loads: u64,
    pub kernel_submits: u64,
    pub kernel_requeues: u64,
    pub kernel_completions: u64,
    pub cache_hits: u64,
    pub cache_probe_hits: u64,
    pub cache_gap_hits: u64,
    pub cache_reseeks: u64,
    pub rows_emitted: u64,
}

impl MetricsSnapshot {
    /// Render as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zero() {
        assert_eq!(ScanMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_counters() {
        let metrics = ScanMetrics::new();
        metrics.increment_chunks_loaded();
        metrics.increment_chunks_loaded();
        metrics.add_chunks_released(2);
        metrics.increment_cache_reseeks();
        metrics.increment_rows_emitted();

        let snap = metrics.snapshot();
        assert_eq!(snap.chunks_loaded, 2);
        assert_eq!(snap.chunks_released, 2);
        assert_eq!(snap.cache_reseeks, 1);
        assert_eq!(snap.rows_emitted, 1);
    }

    #[test]
    fn test_to_json() {
        let metrics = ScanMetrics::new();
        metrics.increment_kernel_requeues();
        let parsed: serde_json::Value = serde_json::from_str(&metrics.snapshot().to_json()).unwrap();
        assert_eq!(parsed["kernel_requeues"], 1);
        assert_eq!(parsed["rows_emitted"], 0);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(ScanMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..100 {
                        m.increment_cache_hits();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().cache_hits, 400);
    }
}
