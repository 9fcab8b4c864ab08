//! Hot-path latency statistics.

pub mod latency;

pub use latency::{LatencyHistogram, LatencyReport};
