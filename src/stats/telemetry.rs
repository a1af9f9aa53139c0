// src/stats/telemetry.rs
//! Per-thread hash-rate telemetry
//!
//! Every worker owns one fixed-size ring of (timestamp, cumulative hash
//! count) samples and is its only writer. Readers on other threads may see a
//! slot whose two halves come from different writes; the estimator treats
//! sparse or odd data as "no rate" rather than trusting it.

use crate::utils::error::MinerError;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default number of samples per thread
pub const DEFAULT_CAPACITY: usize = 4096;

/// One telemetry sample
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetrySample {
    /// Milliseconds since the Unix epoch; zero marks an empty slot
    pub timestamp_ms: u64,
    /// Hashes computed by the thread so far
    pub hash_count: u64,
}

struct SampleRing {
    counts: Box<[AtomicU64]>,
    stamps: Box<[AtomicU64]>,
    /// Next slot to write
    top: AtomicUsize,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        SampleRing {
            counts: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
            stamps: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
            top: AtomicUsize::new(0),
        }
    }

    fn slot(&self, idx: usize) -> TelemetrySample {
        TelemetrySample {
            timestamp_ms: self.stamps[idx].load(Ordering::Relaxed),
            hash_count: self.counts[idx].load(Ordering::Relaxed),
        }
    }
}

/// Hash-rate samples of all worker threads
pub struct Telemetry {
    rings: Vec<SampleRing>,
    mask: usize,
}

/// Current wall-clock time in milliseconds
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Telemetry {
    /// Creates empty rings for `threads` workers
    ///
    /// # Errors
    /// `ConfigError` unless `capacity` is a power of two of at least 2.
    pub fn new(threads: usize, capacity: usize) -> Result<Self, MinerError> {
        if capacity < 2 || !capacity.is_power_of_two() {
            return Err(MinerError::ConfigError(format!(
                "telemetry capacity {} is not a power of two >= 2",
                capacity
            )));
        }
        Ok(Telemetry {
            rings: (0..threads).map(|_| SampleRing::new(capacity)).collect(),
            mask: capacity - 1,
        })
    }

    /// Number of threads tracked
    pub fn thread_count(&self) -> usize {
        self.rings.len()
    }

    /// Samples kept per thread
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Appends a sample to `thread`'s ring, overwriting the oldest
    ///
    /// Must only be called by the thread that owns the ring.
    pub fn record(&self, thread: usize, hash_count: u64, timestamp_ms: u64) {
        let Some(ring) = self.rings.get(thread) else {
            return;
        };
        let top = ring.top.load(Ordering::Relaxed);
        ring.counts[top].store(hash_count, Ordering::Relaxed);
        ring.stamps[top].store(timestamp_ms, Ordering::Relaxed);
        ring.top.store((top + 1) & self.mask, Ordering::Release);
    }

    /// Hash rate of `thread` over the last `window_ms`, in hashes per second
    pub fn estimate_rate(&self, thread: usize, window_ms: u64) -> Option<f64> {
        self.estimate_rate_at(thread, window_ms, now_ms())
    }

    /// [`Telemetry::estimate_rate`] against an explicit clock
    ///
    /// Walks back from the newest sample. The oldest sample still inside the
    /// window and the newest sample are the endpoints. `None` when the ring
    /// does not reach back past the window, or the endpoints coincide.
    pub fn estimate_rate_at(&self, thread: usize, window_ms: u64, now_ms: u64) -> Option<f64> {
        let ring = self.rings.get(thread)?;
        let top = ring.top.load(Ordering::Acquire);

        let mut earliest = TelemetrySample {
            timestamp_ms: 0,
            hash_count: 0,
        };
        let mut latest = earliest;
        let mut full_window = false;

        // top is the next empty slot, so start one behind it
        for i in 1..self.capacity() {
            let sample = ring.slot(top.wrapping_sub(i) & self.mask);
            if sample.timestamp_ms == 0 {
                break;
            }

            if latest.timestamp_ms == 0 {
                latest = sample;
            }

            if now_ms.saturating_sub(sample.timestamp_ms) > window_ms {
                full_window = true;
                break;
            }

            earliest = sample;
        }

        if !full_window || earliest.timestamp_ms == 0 || latest.timestamp_ms == 0 {
            return None;
        }

        let span_ms = latest.timestamp_ms.checked_sub(earliest.timestamp_ms)?;
        if span_ms == 0 {
            return None;
        }

        let hashes = latest.hash_count.saturating_sub(earliest.hash_count) as f64;
        Some(hashes / (span_ms as f64 / 1000.0))
    }

    /// Stored samples of `thread`, oldest first
    pub fn samples(&self, thread: usize) -> Vec<TelemetrySample> {
        let Some(ring) = self.rings.get(thread) else {
            return Vec::new();
        };
        let top = ring.top.load(Ordering::Acquire);
        (0..self.capacity())
            .map(|i| ring.slot((top + i) & self.mask))
            .filter(|s| s.timestamp_ms != 0)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One sample per second at 2000 H/s, ending at `end_ms`
    fn steady(telemetry: &Telemetry, thread: usize, end_ms: u64, seconds: u64) {
        for s in (0..=seconds).rev() {
            let ts = end_ms - s * 1000;
            telemetry.record(thread, (seconds - s) * 2000, ts);
        }
    }

    #[test]
    fn capacity_must_be_power_of_two() {
        assert!(Telemetry::new(1, 0).is_err());
        assert!(Telemetry::new(1, 1).is_err());
        assert!(Telemetry::new(1, 12).is_err());
        assert_eq!(Telemetry::new(3, 16).unwrap().capacity(), 16);
    }

    #[test]
    fn empty_and_single_sample_are_undefined() {
        let t = Telemetry::new(1, 16).unwrap();
        assert_eq!(t.estimate_rate_at(0, 1000, 50_000), None);
        t.record(0, 10, 49_000);
        assert_eq!(t.estimate_rate_at(0, 500, 50_000), None);
        assert_eq!(t.estimate_rate_at(0, 5000, 50_000), None);
    }

    #[test]
    fn steady_rate_over_window() {
        let t = Telemetry::new(1, 64).unwrap();
        steady(&t, 0, 100_000, 20);
        let rate = t.estimate_rate_at(0, 5000, 100_000).unwrap();
        assert!((rate - 2000.0).abs() < 1e-9, "rate {}", rate);
    }

    #[test]
    fn window_longer_than_history_is_undefined() {
        let t = Telemetry::new(1, 64).unwrap();
        steady(&t, 0, 100_000, 10);
        assert!(t.estimate_rate_at(0, 9_000, 100_000).is_some());
        assert_eq!(t.estimate_rate_at(0, 60_000, 100_000), None);
    }

    #[test]
    fn history_beyond_capacity_is_undefined() {
        // 8 slots cover 7 seconds, a 10 second window cannot be spanned
        let t = Telemetry::new(1, 8).unwrap();
        steady(&t, 0, 100_000, 30);
        assert_eq!(t.estimate_rate_at(0, 10_000, 100_000), None);
        assert!(t.estimate_rate_at(0, 3_000, 100_000).is_some());
    }

    #[test]
    fn equal_timestamps_are_undefined() {
        let t = Telemetry::new(1, 16).unwrap();
        t.record(0, 0, 1_000);
        t.record(0, 100, 5_000);
        t.record(0, 200, 5_000);
        assert_eq!(t.estimate_rate_at(0, 2_000, 5_000), None);
    }

    #[test]
    fn ring_keeps_last_capacity_samples_in_order() {
        let t = Telemetry::new(1, 8).unwrap();
        for i in 1..=11u64 {
            t.record(0, i * 10, i * 1000);
        }
        let stamps: Vec<u64> = t.samples(0).iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(stamps, (4..=11).map(|i| i * 1000).collect::<Vec<_>>());
    }

    #[test]
    fn threads_are_independent() {
        let t = Telemetry::new(2, 64).unwrap();
        steady(&t, 1, 100_000, 20);
        assert_eq!(t.estimate_rate_at(0, 5000, 100_000), None);
        assert!(t.estimate_rate_at(1, 5000, 100_000).is_some());
        assert_eq!(t.estimate_rate_at(7, 5000, 100_000), None);
        assert!(t.samples(0).is_empty());
    }

    #[test]
    fn rate_is_never_negative_for_growing_counts() {
        let t = Telemetry::new(1, 128).unwrap();
        let mut count = 0;
        for i in 1..=100u64 {
            count += i % 7;
            t.record(0, count, 10_000 + i * 250);
        }
        for window in [1_000, 5_000, 20_000] {
            if let Some(rate) = t.estimate_rate_at(0, window, 35_000) {
                assert!(rate >= 0.0);
            }
        }
    }
}
