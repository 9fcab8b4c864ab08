//! RX/TX worker threads bridged to the main thread by SPSC rings.
//!
//! Responsibilities:
//! - Tune the endpoint's socket buffers and receive timeout.
//! - Spawn the RX and TX workers (signal-masked, optionally pinned and
//!   SCHED_FIFO).
//! - Own the two rings, the packet/drop counters, and the three latency
//!   histograms (RX processing, TX send, RX inter-arrival).
//! - Expose `enqueue_tx` / `dequeue_rx` for the main thread and join both
//!   workers on `stop`.
//!
//! The RX callback runs **on the RX thread**. It must not block and must not
//! take any lock the main thread holds while touching the rings; decoder
//! state mutated inside it is therefore confined to the RX thread.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use minstant::Instant;

use crate::net::{UdpEndpoint, is_transient};
use crate::spsc::{self, Consumer, MAX_PACKET_SIZE, Producer, RING_CAPACITY};
use crate::stats::LatencyHistogram;
use crate::trace::{debug, error, info};

use super::rt;

/// Receive timeout bounding how long the RX worker can sleep before it
/// re-checks the shutdown flag.
pub const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Back-off sleep when the TX ring is empty.
const TX_IDLE_BACKOFF: Duration = Duration::from_micros(10);

/// Callback invoked on the RX thread for every received datagram.
pub type RxCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Worker placement, scheduling, and socket buffer configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// CPU core for the RX thread (`None` = unpinned).
    pub rx_core: Option<usize>,
    /// CPU core for the TX thread (`None` = unpinned).
    pub tx_core: Option<usize>,
    /// SCHED_FIFO priority for the RX thread (1-99).
    pub rx_priority: i32,
    /// SCHED_FIFO priority for the TX thread (1-99).
    pub tx_priority: i32,
    /// Whether to request SCHED_FIFO at all.
    pub realtime: bool,
    /// Requested SO_RCVBUF in bytes.
    pub rx_buffer_size: usize,
    /// Requested SO_SNDBUF in bytes.
    pub tx_buffer_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            rx_core: None,
            tx_core: None,
            rx_priority: 80,
            tx_priority: 70,
            realtime: false,
            rx_buffer_size: 2 * 1024 * 1024,
            tx_buffer_size: 1024 * 1024,
        }
    }
}

/// Error starting the worker pair. CPU affinity and scheduling problems are
/// deliberately absent: those degrade with a warning instead of failing.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("failed to configure socket buffers: {0}")]
    Buffer(#[source] io::Error),
    #[error("failed to spawn {name} worker: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Packet and drop counters, captured with relaxed loads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficCounts {
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_drops: u64,
    pub tx_drops: u64,
}

/// State shared between the workers and the main thread.
struct Shared {
    running: AtomicBool,
    rx_packets: AtomicU64,
    tx_packets: AtomicU64,
    rx_drops: AtomicU64,
    tx_drops: AtomicU64,
    rx_latency: LatencyHistogram,
    tx_latency: LatencyHistogram,
    rx_interval: LatencyHistogram,
}

impl Shared {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            rx_packets: AtomicU64::new(0),
            tx_packets: AtomicU64::new(0),
            rx_drops: AtomicU64::new(0),
            tx_drops: AtomicU64::new(0),
            rx_latency: LatencyHistogram::new(),
            tx_latency: LatencyHistogram::new(),
            rx_interval: LatencyHistogram::new(),
        }
    }
}

/// Owner of the RX/TX worker pair.
pub struct ThreadManager {
    shared: Arc<Shared>,
    tx_producer: Producer<RING_CAPACITY>,
    rx_consumer: Consumer<RING_CAPACITY>,
    handles: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
}

impl ThreadManager {
    /// Tunes the endpoint and spawns both workers.
    ///
    /// The requested socket buffer sizes are applied first; the kernel may
    /// cap (or double) them, so both the requested and effective values are
    /// logged. The receive timeout is pinned to [`RECV_TIMEOUT`] so the RX
    /// worker observes shutdown promptly.
    ///
    /// # Errors
    ///
    /// [`ManagerError::Buffer`] when socket options cannot be applied,
    /// [`ManagerError::Spawn`] when a worker thread cannot be created.
    pub fn start(
        endpoint: UdpEndpoint,
        config: &WorkerConfig,
        rx_callback: Option<RxCallback>,
    ) -> Result<Self, ManagerError> {
        configure_socket_buffers(&endpoint, config).map_err(ManagerError::Buffer)?;
        endpoint
            .set_recv_timeout(RECV_TIMEOUT)
            .map_err(ManagerError::Buffer)?;

        let endpoint = Arc::new(endpoint);
        let shared = Arc::new(Shared::new());

        let (rx_producer, rx_consumer) = spsc::channel::<RING_CAPACITY>();
        let (tx_producer, tx_consumer) = spsc::channel::<RING_CAPACITY>();

        let rx_handle = {
            let endpoint = Arc::clone(&endpoint);
            let worker_shared = Arc::clone(&shared);
            let cfg = config.clone();
            thread::Builder::new()
                .name("pulselink-rx".into())
                .spawn(move || rx_worker(&endpoint, &worker_shared, &rx_producer, rx_callback, &cfg))
        };
        let rx_handle = match rx_handle {
            Ok(handle) => handle,
            Err(source) => {
                shared.running.store(false, Ordering::Release);
                return Err(ManagerError::Spawn { name: "RX", source });
            }
        };

        let tx_handle = {
            let endpoint = Arc::clone(&endpoint);
            let worker_shared = Arc::clone(&shared);
            let cfg = config.clone();
            thread::Builder::new()
                .name("pulselink-tx".into())
                .spawn(move || tx_worker(&endpoint, &worker_shared, &tx_consumer, &cfg))
        };
        let tx_handle = match tx_handle {
            Ok(handle) => handle,
            Err(source) => {
                shared.running.store(false, Ordering::Release);
                let _ = rx_handle.join();
                return Err(ManagerError::Spawn { name: "TX", source });
            }
        };

        info!(
            rx_core = ?config.rx_core,
            tx_core = ?config.tx_core,
            realtime = config.realtime,
            "worker pair started"
        );

        Ok(Self {
            shared,
            tx_producer,
            rx_consumer,
            handles: Mutex::new(Some((rx_handle, tx_handle))),
        })
    }

    /// Queues one packet for transmission. Main-thread producer only.
    ///
    /// Returns `false` and bumps the TX drop counter when the ring is full
    /// or the packet is oversized.
    pub fn enqueue_tx(&self, bytes: &[u8]) -> bool {
        if self.tx_producer.push(bytes) {
            true
        } else {
            self.shared.tx_drops.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Pops one received packet queued by the RX worker. Main-thread
    /// consumer only.
    #[must_use]
    pub fn dequeue_rx(&self, out: &mut [u8]) -> Option<usize> {
        self.rx_consumer.pop(out)
    }

    #[must_use]
    pub fn tx_queue_len(&self) -> usize {
        self.tx_producer.len()
    }

    #[must_use]
    pub fn rx_queue_len(&self) -> usize {
        self.rx_consumer.len()
    }

    #[must_use]
    pub fn counts(&self) -> TrafficCounts {
        TrafficCounts {
            rx_packets: self.shared.rx_packets.load(Ordering::Relaxed),
            tx_packets: self.shared.tx_packets.load(Ordering::Relaxed),
            rx_drops: self.shared.rx_drops.load(Ordering::Relaxed),
            tx_drops: self.shared.tx_drops.load(Ordering::Relaxed),
        }
    }

    /// RX processing latency: receive completion to callback completion.
    #[must_use]
    pub fn rx_latency(&self) -> &LatencyHistogram {
        &self.shared.rx_latency
    }

    /// TX send latency: duration of the send call.
    #[must_use]
    pub fn tx_latency(&self) -> &LatencyHistogram {
        &self.shared.tx_latency
    }

    /// Inter-arrival jitter between consecutive received packets.
    #[must_use]
    pub fn rx_interval(&self) -> &LatencyHistogram {
        &self.shared.rx_interval
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Signals both workers to finish their current iteration and joins
    /// them. Safe to call multiple times.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);

        let mut guard = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some((rx, tx)) = guard.take() {
            let _ = rx.join();
            let _ = tx.join();

            let counts = self.counts();
            info!(
                rx_packets = counts.rx_packets,
                rx_drops = counts.rx_drops,
                tx_packets = counts.tx_packets,
                tx_drops = counts.tx_drops,
                "worker pair stopped"
            );
        }
    }
}

impl Drop for ThreadManager {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Applies SO_RCVBUF / SO_SNDBUF, logging requested vs effective sizes.
fn configure_socket_buffers(endpoint: &UdpEndpoint, config: &WorkerConfig) -> io::Result<()> {
    use rustix::net::sockopt;

    let fd = std::os::fd::AsFd::as_fd(endpoint);

    if config.rx_buffer_size > 0 {
        sockopt::set_socket_recv_buffer_size(fd, config.rx_buffer_size)?;
        let effective = sockopt::socket_recv_buffer_size(fd)?;
        info!(
            requested = config.rx_buffer_size,
            effective, "SO_RCVBUF configured"
        );
    }
    if config.tx_buffer_size > 0 {
        sockopt::set_socket_send_buffer_size(fd, config.tx_buffer_size)?;
        let effective = sockopt::socket_send_buffer_size(fd)?;
        info!(
            requested = config.tx_buffer_size,
            effective, "SO_SNDBUF configured"
        );
    }
    Ok(())
}

/// RX worker: blocking receive, interval + processing latency measurement,
/// ring push, callback dispatch.
fn rx_worker(
    endpoint: &UdpEndpoint,
    shared: &Shared,
    ring: &Producer<RING_CAPACITY>,
    mut callback: Option<RxCallback>,
    config: &WorkerConfig,
) {
    rt::block_shutdown_signals();
    rt::configure_thread("rx", config.rx_core, config.rx_priority, config.realtime);
    debug!("RX worker running");

    let mut buf = [0u8; MAX_PACKET_SIZE];
    let mut last_rx: Option<Instant> = None;

    while shared.running.load(Ordering::Acquire) {
        match endpoint.recv(&mut buf) {
            Ok(n) if n > 0 => {
                let rx_start = Instant::now();
                shared.rx_packets.fetch_add(1, Ordering::Relaxed);

                if let Some(prev) = last_rx {
                    shared.rx_interval.record_span(prev, rx_start);
                }
                last_rx = Some(rx_start);

                if !ring.push(&buf[..n]) {
                    shared.rx_drops.fetch_add(1, Ordering::Relaxed);
                }
                if let Some(cb) = callback.as_mut() {
                    cb(&buf[..n]);
                }

                shared.rx_latency.record_span(rx_start, Instant::now());
            }
            Ok(_) => {} // zero-length datagram
            Err(e) if is_transient(&e) => {}
            Err(e) => {
                error!(error = %e, "RX worker: fatal receive error, exiting loop");
                break;
            }
        }
    }

    debug!("RX worker exiting");
}

/// TX worker: drain the TX ring, send, measure the send call.
fn tx_worker(
    endpoint: &UdpEndpoint,
    shared: &Shared,
    ring: &Consumer<RING_CAPACITY>,
    config: &WorkerConfig,
) {
    rt::block_shutdown_signals();
    rt::configure_thread("tx", config.tx_core, config.tx_priority, config.realtime);
    debug!("TX worker running");

    let mut buf = [0u8; MAX_PACKET_SIZE];

    while shared.running.load(Ordering::Acquire) {
        match ring.pop(&mut buf) {
            Some(len) => {
                let tx_start = Instant::now();
                let sent = endpoint.send(&buf[..len]);
                let tx_end = Instant::now();

                match sent {
                    Ok(n) if n > 0 => {
                        shared.tx_packets.fetch_add(1, Ordering::Relaxed);
                        shared.tx_latency.record_span(tx_start, tx_end);
                    }
                    Ok(_) => {
                        shared.tx_drops.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) if is_transient(&e) => {
                        shared.tx_drops.fetch_add(1, Ordering::Relaxed);
                        debug!(error = %e, "TX worker: transient send failure, packet dropped");
                    }
                    Err(e) => {
                        shared.tx_drops.fetch_add(1, Ordering::Relaxed);
                        error!(error = %e, "TX worker: fatal send error, exiting loop");
                        break;
                    }
                }
            }
            None => thread::sleep(TX_IDLE_BACKOFF),
        }
    }

    debug!("TX worker exiting");
}
