//! Output interface between the core and its embedding.
//!
//! The core never renders a UI. It emits textual packet/event records, the
//! periodic dashboard triple, and the shutdown summary through this trait;
//! the binary installs a stdout sink and a TUI embedding can install its
//! own.

use crate::runtime::TrafficCounts;
use crate::stats::LatencyReport;

/// Final counters and percentile tables emitted once after the workers have
/// joined.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownSummary {
    pub counts: TrafficCounts,
    pub rx_latency: LatencyReport,
    pub tx_latency: LatencyReport,
    pub rx_interval: LatencyReport,
}

/// Record sink provided by the embedding.
///
/// Must be thread-safe: the RX worker logs decode events while the main
/// thread logs TX/monitor events and dashboard updates.
pub trait Sink: Send + Sync {
    /// One textual packet/event record.
    fn log(&self, line: &str);

    /// Periodic statistics triple: TX send latency, RX processing latency,
    /// RX inter-arrival jitter.
    fn update_dashboard(&self, tx: &LatencyReport, rx: &LatencyReport, interval: &LatencyReport);

    /// Final counters and percentile tables, emitted once per run.
    fn shutdown_summary(&self, summary: &ShutdownSummary);
}

/// Line-oriented sink writing everything to stdout.
///
/// The dashboard triple is compressed to a single line per update; the full
/// percentile tables are printed only in the shutdown summary.
pub struct StdoutSink;

impl Sink for StdoutSink {
    fn log(&self, line: &str) {
        println!("{line}");
    }

    fn update_dashboard(&self, tx: &LatencyReport, rx: &LatencyReport, interval: &LatencyReport) {
        println!(
            "[stats] tx p50/p99/max {:.1}/{:.1}/{:.1} us | rx p50/p99/max {:.1}/{:.1}/{:.1} us | interval p50/p99/max {:.1}/{:.1}/{:.1} us",
            tx.p50_us,
            tx.p99_us,
            tx.max_us,
            rx.p50_us,
            rx.p99_us,
            rx.max_us,
            interval.p50_us,
            interval.p99_us,
            interval.max_us,
        );
    }

    fn shutdown_summary(&self, summary: &ShutdownSummary) {
        println!(
            "rx packets: {}, dropped: {}\ntx packets: {}, dropped: {}",
            summary.counts.rx_packets,
            summary.counts.rx_drops,
            summary.counts.tx_packets,
            summary.counts.tx_drops,
        );
        print!("{}", summary.rx_latency.render("RX processing latency"));
        print!("{}", summary.tx_latency.render("TX send latency"));
        print!("{}", summary.rx_interval.render("RX inter-packet interval"));
    }
}
