//! Liveness and stability tracking keyed to the received lifesign counter.
//!
//! The monitor lives next to the RX-thread decoder and is updated on every
//! successful decode. Two health signals come out of it:
//!
//! - **Loss of communication**: the lifesign counter has not *changed* within
//!   the configured timeout. The instant of the most recent change is also
//!   published through a shared [`LinkPulse`] stamp so the main thread can
//!   run this check without touching RX-thread state.
//! - **Unstable communication**: the most recent inter-arrival interval fell
//!   outside the `expected ± tolerance` window.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use minstant::Instant;

/// Default timeout before a frozen lifesign is declared lost (ms).
pub const DEFAULT_COMM_TIMEOUT_MS: u32 = 1000;

/// Default expected inter-arrival interval (ms).
pub const DEFAULT_EXPECTED_INTERVAL_MS: u32 = 100;

/// Default tolerance around the expected interval (µs).
pub const DEFAULT_TOLERANCE_US: u32 = 5000;

/// Link-health error state held by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("inter-arrival interval outside tolerance window")]
    Unstable,
    #[error("no lifesign change within the communication timeout")]
    Lost,
}

/// Monitor tuning knobs.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Frozen-lifesign timeout in milliseconds.
    pub comm_timeout_ms: u32,
    /// Expected inter-arrival interval in milliseconds.
    pub expected_interval_ms: u32,
    /// Allowed deviation from the expected interval in microseconds.
    pub tolerance_us: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            comm_timeout_ms: DEFAULT_COMM_TIMEOUT_MS,
            expected_interval_ms: DEFAULT_EXPECTED_INTERVAL_MS,
            tolerance_us: DEFAULT_TOLERANCE_US,
        }
    }
}

/// Atomically published stamp of the most recent lifesign change, in
/// nanoseconds against a fixed origin instant.
struct LinkPulse {
    origin: Instant,
    last_change_ns: AtomicU64,
}

impl LinkPulse {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_change_ns: AtomicU64::new(0),
        }
    }

    fn stamp_of(&self, instant: Instant) -> u64 {
        instant.duration_since(self.origin).as_nanos() as u64
    }

    fn mark_change(&self, instant: Instant) {
        self.last_change_ns
            .store(self.stamp_of(instant), Ordering::Release);
    }

    fn ns_since_change(&self) -> u64 {
        let now = self.stamp_of(Instant::now());
        now.saturating_sub(self.last_change_ns.load(Ordering::Acquire))
    }
}

/// Read-only comm-loss check, safe on any thread.
///
/// Obtained from [`LinkMonitor::watch`]; reads only the atomically published
/// change stamp.
#[derive(Clone)]
pub struct CommWatch {
    pulse: Arc<LinkPulse>,
    timeout: Duration,
}

impl CommWatch {
    /// True when the lifesign has not changed within the timeout.
    #[must_use]
    pub fn is_lost(&self) -> bool {
        self.pulse.ns_since_change() >= self.timeout.as_nanos() as u64
    }

    /// Milliseconds elapsed since the last lifesign change.
    #[must_use]
    pub fn ms_since_change(&self) -> u64 {
        self.pulse.ns_since_change() / 1_000_000
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Per-peer liveness and stability state. RX-thread-confined; see
/// [`CommWatch`] for the cross-thread view.
pub struct LinkMonitor {
    pulse: Arc<LinkPulse>,

    rx_lifesign: u16,
    rx_lifesign_prev: u16,
    last_change: Instant,
    last_recv: Instant,

    comm_timeout_ms: u32,
    expected_interval_ms: u32,
    tolerance_us: u32,

    last_interval_us: u32,
    unstable_counter: u16,
    comm_unstable: bool,

    error: Option<LinkError>,
}

impl LinkMonitor {
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        let pulse = Arc::new(LinkPulse::new());
        let now = Instant::now();
        pulse.mark_change(now);

        Self {
            pulse,
            rx_lifesign: 0,
            rx_lifesign_prev: 0,
            last_change: now,
            last_recv: now,
            comm_timeout_ms: config.comm_timeout_ms,
            expected_interval_ms: config.expected_interval_ms,
            tolerance_us: config.tolerance_us,
            last_interval_us: 0,
            unstable_counter: 0,
            comm_unstable: false,
            error: None,
        }
    }

    /// Returns a cross-thread handle for the comm-loss check.
    #[must_use]
    pub fn watch(&self) -> CommWatch {
        CommWatch {
            pulse: Arc::clone(&self.pulse),
            timeout: Duration::from_millis(u64::from(self.comm_timeout_ms)),
        }
    }

    /// Feeds one received lifesign observed at `now` into the monitor.
    ///
    /// Called by the decoder after CRC verification succeeds; rejected
    /// packets must never advance this state.
    pub(crate) fn observe(&mut self, lifesign: u16, now: Instant) {
        self.last_interval_us = now.duration_since(self.last_recv).as_micros() as u32;
        self.last_recv = now;

        let expected_us = self.expected_interval_ms.saturating_mul(1000);
        let lower = expected_us.saturating_sub(self.tolerance_us);
        let upper = expected_us.saturating_add(self.tolerance_us);

        if self.last_interval_us < lower || self.last_interval_us > upper {
            self.unstable_counter = self.unstable_counter.saturating_add(1);
            self.comm_unstable = true;
            if self.error.is_none() {
                self.error = Some(LinkError::Unstable);
            }
        } else {
            self.unstable_counter = 0;
            self.comm_unstable = false;
            if self.error == Some(LinkError::Unstable) {
                self.error = None;
            }
        }

        self.rx_lifesign_prev = self.rx_lifesign;
        self.rx_lifesign = lifesign;

        if self.rx_lifesign != self.rx_lifesign_prev {
            self.last_change = now;
            self.pulse.mark_change(now);
            if self.error == Some(LinkError::Lost) {
                self.error = None;
            }
        }
    }

    /// RX-thread comm-loss check against the locally held change instant.
    #[must_use]
    pub fn is_comm_lost(&self) -> bool {
        self.ms_since_change() >= u64::from(self.comm_timeout_ms)
    }

    /// True when the last inter-arrival interval was outside tolerance.
    #[must_use]
    pub fn is_comm_unstable(&self) -> bool {
        self.comm_unstable
    }

    /// Milliseconds since the last lifesign change.
    #[must_use]
    pub fn ms_since_change(&self) -> u64 {
        Instant::now().duration_since(self.last_change).as_millis() as u64
    }

    #[must_use]
    pub fn last_interval_us(&self) -> u32 {
        self.last_interval_us
    }

    /// Consecutive out-of-tolerance intervals, saturating at `u16::MAX`.
    #[must_use]
    pub fn unstable_counter(&self) -> u16 {
        self.unstable_counter
    }

    #[must_use]
    pub fn rx_lifesign(&self) -> u16 {
        self.rx_lifesign
    }

    #[must_use]
    pub fn comm_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.comm_timeout_ms))
    }

    #[must_use]
    pub fn link_error(&self) -> Option<LinkError> {
        self.error
    }

    /// Rearms the monitor after a reconnect: clears lifesign tracking,
    /// stability counters, and any monitor-originated error.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.rx_lifesign = 0;
        self.rx_lifesign_prev = 0;
        self.last_change = now;
        self.last_recv = now;
        self.pulse.mark_change(now);

        self.last_interval_us = 0;
        self.unstable_counter = 0;
        self.comm_unstable = false;
        self.error = None;
    }
}

impl Default for LinkMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> LinkMonitor {
        LinkMonitor::new(MonitorConfig {
            comm_timeout_ms: 1000,
            expected_interval_ms: 100,
            tolerance_us: 5000,
        })
    }

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn in_tolerance_interval_is_stable() {
        let mut m = monitor();
        let t0 = Instant::now();

        m.observe(1, t0); // first packet: near-zero interval, unstable
        assert!(m.is_comm_unstable());
        assert_eq!(m.unstable_counter(), 1);

        m.observe(2, t0 + 100 * MS);
        assert!(!m.is_comm_unstable());
        assert_eq!(m.unstable_counter(), 0);
        assert_eq!(m.link_error(), None);
        assert_eq!(m.last_interval_us(), 100_000);
    }

    #[test]
    fn delayed_packet_flags_unstable_once() {
        let mut m = monitor();
        let t0 = Instant::now();

        m.observe(1, t0);
        m.observe(2, t0 + 100 * MS);
        assert_eq!(m.unstable_counter(), 0);

        // One packet arrives 150 ms after the previous one.
        m.observe(3, t0 + 250 * MS);
        assert!(m.is_comm_unstable());
        assert_eq!(m.unstable_counter(), 1);
        assert_eq!(m.link_error(), Some(LinkError::Unstable));

        // Back to cadence: stability recovers and the error demotes.
        m.observe(4, t0 + 350 * MS);
        assert!(!m.is_comm_unstable());
        assert_eq!(m.unstable_counter(), 0);
        assert_eq!(m.link_error(), None);
    }

    #[test]
    fn tolerance_window_boundaries() {
        let mut m = monitor();
        let t0 = Instant::now();
        m.observe(1, t0);

        // 95 ms and 105 ms are inclusive bounds for 100 ms ± 5 ms.
        m.observe(2, t0 + 95 * MS);
        assert!(!m.is_comm_unstable());

        m.observe(3, t0 + 95 * MS + 105 * MS);
        assert!(!m.is_comm_unstable());

        m.observe(4, t0 + 95 * MS + 105 * MS + 106 * MS);
        assert!(m.is_comm_unstable());
    }

    #[test]
    fn unstable_counter_accumulates_and_saturates() {
        let mut m = LinkMonitor::new(MonitorConfig {
            tolerance_us: 0,
            ..MonitorConfig::default()
        });
        let t0 = Instant::now();

        let mut t = t0;
        for i in 0..5u16 {
            m.observe(i, t);
            t += 500 * MS;
        }
        assert_eq!(m.unstable_counter(), 5);

        // Saturation behavior at the counter ceiling.
        for _ in 0..u16::MAX {
            m.observe(m.rx_lifesign().wrapping_add(1), t);
            t += 500 * MS;
        }
        assert_eq!(m.unstable_counter(), u16::MAX);
    }

    #[test]
    fn frozen_lifesign_is_lost_after_timeout() {
        let mut m = LinkMonitor::new(MonitorConfig {
            comm_timeout_ms: 50,
            ..MonitorConfig::default()
        });
        let watch = m.watch();

        m.observe(7, Instant::now());
        assert!(!watch.is_lost());
        assert!(!m.is_comm_lost());

        std::thread::sleep(Duration::from_millis(70));
        assert!(watch.is_lost());
        assert!(m.is_comm_lost());

        // A changed lifesign revives the link on both views.
        m.observe(8, Instant::now());
        assert!(!watch.is_lost());
        assert!(!m.is_comm_lost());
    }

    #[test]
    fn repeated_lifesign_does_not_mark_change() {
        let mut m = LinkMonitor::new(MonitorConfig {
            comm_timeout_ms: 50,
            ..MonitorConfig::default()
        });
        let watch = m.watch();

        m.observe(7, Instant::now());
        std::thread::sleep(Duration::from_millis(70));

        // Same counter value again: the peer is retransmitting, not alive.
        m.observe(7, Instant::now());
        assert!(watch.is_lost());
    }

    #[test]
    fn watch_is_usable_from_another_thread() {
        let mut m = LinkMonitor::new(MonitorConfig {
            comm_timeout_ms: 40,
            ..MonitorConfig::default()
        });
        let watch = m.watch();
        m.observe(1, Instant::now());

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(60));
            watch.is_lost()
        });
        assert!(handle.join().unwrap());
    }

    #[test]
    fn reset_clears_error_and_counters() {
        let mut m = LinkMonitor::new(MonitorConfig {
            tolerance_us: 0,
            ..MonitorConfig::default()
        });
        m.observe(1, Instant::now());
        assert!(m.is_comm_unstable());

        m.reset();
        assert!(!m.is_comm_unstable());
        assert_eq!(m.unstable_counter(), 0);
        assert_eq!(m.rx_lifesign(), 0);
        assert_eq!(m.link_error(), None);
    }
}
