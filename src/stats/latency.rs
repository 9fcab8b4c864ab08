//! Single-producer latency percentile collector.
//!
//! Raw nanosecond samples go into a fixed-capacity circular buffer with O(1)
//! recording; percentile computation snapshots and sorts on demand (cold
//! path). When the buffer is full the oldest samples are overwritten.
//!
//! # Thread safety
//!
//! [`LatencyHistogram::record`] is meant for a single producer thread;
//! [`LatencyHistogram::compute`] may run concurrently on any thread. The
//! snapshot is a best-effort view: samples in the overwrite region may be
//! observed as either their old or new value, which is acceptable for a
//! statistical metric.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use minstant::Instant;

/// Default sample retention: ~2.7 hours at 10 Hz, ~10 seconds at 10 kHz.
pub const DEFAULT_CAPACITY: usize = 100_000;

/// Control word kept off the sample array's cache lines; both fields are
/// written only by the producer.
#[repr(align(64))]
struct Cursor {
    write_idx: AtomicUsize,
    total: AtomicU64,
}

/// Fixed-capacity circular store of nanosecond samples.
pub struct LatencyHistogram {
    samples: Box<[AtomicU64]>,
    cursor: Cursor,
}

impl LatencyHistogram {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "histogram capacity must be non-zero");
        let samples: Box<[AtomicU64]> = (0..capacity).map(|_| AtomicU64::new(0)).collect();
        Self {
            samples,
            cursor: Cursor {
                write_idx: AtomicUsize::new(0),
                total: AtomicU64::new(0),
            },
        }
    }

    /// Records one latency sample in nanoseconds. O(1), producer-only.
    #[inline]
    pub fn record(&self, latency_ns: u64) {
        let idx = self.cursor.write_idx.load(Ordering::Relaxed);
        self.samples[idx].store(latency_ns, Ordering::Relaxed);

        let next = if idx + 1 == self.samples.len() { 0 } else { idx + 1 };
        self.cursor.write_idx.store(next, Ordering::Release);
        self.cursor.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the span between two monotonic instants.
    #[inline]
    pub fn record_span(&self, start: Instant, end: Instant) {
        self.record(end.duration_since(start).as_nanos() as u64);
    }

    /// Total samples recorded, including overwritten ones.
    #[must_use]
    pub fn sample_count(&self) -> u64 {
        self.cursor.total.load(Ordering::Relaxed)
    }

    /// Discards all samples. Only valid while the producer is quiescent.
    pub fn reset(&self) {
        self.cursor.write_idx.store(0, Ordering::Release);
        self.cursor.total.store(0, Ordering::Release);
        for sample in &self.samples {
            sample.store(0, Ordering::Relaxed);
        }
    }

    /// Snapshots the buffer, sorts it, and computes the full report.
    ///
    /// O(N log N) where N = min(total recorded, capacity). Safe to call from
    /// any thread while the producer keeps recording.
    #[must_use]
    pub fn compute(&self) -> LatencyReport {
        let capacity = self.samples.len();
        let total = self.cursor.total.load(Ordering::Acquire);
        if total == 0 {
            return LatencyReport::default();
        }

        let n = usize::try_from(total).map_or(capacity, |t| t.min(capacity));

        let mut sorted: Vec<u64> = Vec::with_capacity(n);
        if total <= capacity as u64 {
            // Buffer hasn't wrapped yet.
            sorted.extend(self.samples[..n].iter().map(|s| s.load(Ordering::Relaxed)));
        } else {
            // Wrapped: oldest sample sits at the current write position.
            let write = self.cursor.write_idx.load(Ordering::Acquire);
            sorted.extend(
                self.samples[write..]
                    .iter()
                    .chain(&self.samples[..write])
                    .map(|s| s.load(Ordering::Relaxed)),
            );
        }
        sorted.sort_unstable();

        let to_us = |ns: u64| ns as f64 / 1000.0;

        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        for &ns in &sorted {
            let us = to_us(ns);
            sum += us;
            sum_sq += us * us;
        }
        let count_f = sorted.len() as f64;
        let mean_us = sum / count_f;
        let stdev_us = if sorted.len() > 1 {
            let variance = (sum_sq - sum * sum / count_f) / (count_f - 1.0);
            variance.max(0.0).sqrt()
        } else {
            0.0
        };

        LatencyReport {
            count: total,
            min_us: to_us(sorted[0]),
            max_us: to_us(sorted[sorted.len() - 1]),
            mean_us,
            stdev_us,
            p50_us: to_us(nearest_rank(&sorted, 50.0)),
            p95_us: to_us(nearest_rank(&sorted, 95.0)),
            p99_us: to_us(nearest_rank(&sorted, 99.0)),
            p999_us: to_us(nearest_rank(&sorted, 99.9)),
            p9999_us: to_us(nearest_rank(&sorted, 99.99)),
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Nearest-rank percentile: `sorted[ceil(p/100 * N) - 1]`, rank clamped to
/// `[1, N]`. On very small N the high percentiles all resolve to the maximum.
fn nearest_rank(sorted: &[u64], p: f64) -> u64 {
    debug_assert!(!sorted.is_empty());
    let rank = (p / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Computed statistics snapshot, all values in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencyReport {
    /// Total samples recorded (including overwritten).
    pub count: u64,
    pub min_us: f64,
    pub max_us: f64,
    pub mean_us: f64,
    pub stdev_us: f64,
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
    pub p999_us: f64,
    pub p9999_us: f64,
}

impl LatencyReport {
    /// Renders the bordered percentile table with min-max scaled gauges.
    #[must_use]
    pub fn render(&self, label: &str) -> String {
        use std::fmt::Write;

        if self.count == 0 {
            return format!("[{label}] no samples collected\n");
        }

        let rows = [
            ("Min", self.min_us),
            ("Max", self.max_us),
            ("Mean", self.mean_us),
        ];
        let percentiles = [
            ("p50", self.p50_us),
            ("p95", self.p95_us),
            ("p99", self.p99_us),
            ("p99.9", self.p999_us),
            ("p99.99", self.p9999_us),
        ];

        let mut out = String::new();
        let _ = writeln!(out, "┌──────────────────────────────────────────────┐");
        let _ = writeln!(out, "│ {:<44} │", format!("{label} statistics"));
        let _ = writeln!(out, "├──────────────────────────────────────────────┤");
        let _ = writeln!(out, "│ Samples : {:<34} │", self.count);
        for (name, value) in rows {
            let _ = writeln!(
                out,
                "│ {name:<7} : {value:>10.2} us {} │",
                gauge(value, self.min_us, self.max_us)
            );
        }
        let _ = writeln!(out, "│ StdDev  : {:>10.2} us {:20} │", self.stdev_us, "");
        let _ = writeln!(out, "├──────────────────────────────────────────────┤");
        for (name, value) in percentiles {
            let _ = writeln!(
                out,
                "│ {name:<7} : {value:>10.2} us {} │",
                gauge(value, self.min_us, self.max_us)
            );
        }
        let _ = writeln!(out, "└──────────────────────────────────────────────┘");
        out
    }

    /// One CSV data line matching [`LatencyReport::csv_header`].
    #[must_use]
    pub fn render_csv(&self, label: &str) -> String {
        format!(
            "{},{},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2}\n",
            label,
            self.count,
            self.min_us,
            self.max_us,
            self.mean_us,
            self.stdev_us,
            self.p50_us,
            self.p95_us,
            self.p99_us,
            self.p999_us,
            self.p9999_us,
        )
    }

    #[must_use]
    pub fn csv_header() -> &'static str {
        "label,count,min_us,max_us,mean_us,stdev_us,p50_us,p95_us,p99_us,p999_us,p9999_us\n"
    }
}

/// 20-cell bar scaled between the report's min and max.
fn gauge(value: f64, min: f64, max: f64) -> String {
    const WIDTH: usize = 20;

    if max <= min {
        return "█".repeat(WIDTH);
    }
    let ratio = (value - min) / (max - min);
    let filled = ((ratio * WIDTH as f64) as usize).min(WIDTH);
    format!("{}{}", "█".repeat(filled), "░".repeat(WIDTH - filled))
}
