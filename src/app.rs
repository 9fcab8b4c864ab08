//! Node wiring: endpoint, codecs, workers, and the three periodic timers.
//!
//! [`run`] is the whole lifetime of one node: open the connected socket,
//! start the RX/TX workers with the decode callback, drive the timer event
//! loop until the embedding's shutdown flag goes up, then stop the workers
//! and emit the shutdown summary.

use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crate::event::{EventLoop, EventLoopError, PeriodicTimer, TimerError};
use crate::net::{EndpointError, UdpEndpoint};
use crate::protocol::packet::{PacketDecoder, PacketEncoder, PacketError};
use crate::protocol::monitor::{LinkMonitor, MonitorConfig};
use crate::runtime::{ManagerError, RxCallback, ThreadManager, WorkerConfig};
use crate::sink::{ShutdownSummary, Sink};
use crate::spsc::MAX_PACKET_SIZE;
use crate::trace::{debug, info};

/// Lifesign transmission cadence.
pub const TX_INTERVAL: Duration = Duration::from_millis(100);

/// Communication-loss check cadence.
pub const MONITOR_INTERVAL: Duration = Duration::from_millis(200);

/// Dashboard statistics cadence.
pub const STATS_INTERVAL: Duration = Duration::from_millis(250);

/// Default sender identity carried in every packet.
pub const DEFAULT_UNIQUE_ID: u32 = 0x1234_5678;

/// Payload of the periodic lifesign packet.
const TX_PAYLOAD: &[u8] = b"pulselink lifesign";

/// Everything one node needs to run.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub src: SocketAddr,
    pub dst: SocketAddr,
    pub unique_id: u32,
    pub monitor: MonitorConfig,
    pub worker: WorkerConfig,
}

impl NodeConfig {
    #[must_use]
    pub fn new(src: SocketAddr, dst: SocketAddr) -> Self {
        Self {
            src,
            dst,
            unique_id: DEFAULT_UNIQUE_ID,
            monitor: MonitorConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

/// Initialization failure of one of the node's subsystems.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error(transparent)]
    Manager(#[from] ManagerError),
    #[error(transparent)]
    Timer(#[from] TimerError),
    #[error(transparent)]
    EventLoop(#[from] EventLoopError),
}

/// Runs one node until `shutdown` is observed true.
///
/// # Errors
///
/// Returns an [`AppError`] when any subsystem fails to initialize or the
/// event loop fails; a clean shutdown returns `Ok(())`.
pub fn run(config: NodeConfig, sink: Arc<dyn Sink>, shutdown: &AtomicBool) -> Result<(), AppError> {
    info!(src = %config.src, dst = %config.dst, unique_id = config.unique_id, "node starting");

    let endpoint = UdpEndpoint::open(config.src, config.dst)?;

    // The decoder (and its monitor) moves into the RX callback and is only
    // ever touched on the RX thread; the main thread keeps the watch handle.
    let mut decoder = PacketDecoder::new(LinkMonitor::new(config.monitor.clone()));
    let watch = decoder.monitor().watch();

    let rx_sink = Arc::clone(&sink);
    let rx_callback: RxCallback = Box::new(move |bytes: &[u8]| {
        match decoder.decode(bytes) {
            Ok(view) => {
                let monitor = decoder.monitor();
                rx_sink.log(&format!(
                    "[rx] id={:#010x} lifesign={} len={} interval={} us",
                    view.unique_id,
                    view.lifesign,
                    view.payload.len(),
                    monitor.last_interval_us(),
                ));
                if monitor.is_comm_unstable() {
                    rx_sink.log(&format!(
                        "[rx] warning: communication unstable (count={})",
                        monitor.unstable_counter(),
                    ));
                }
            }
            // Corrupt datagrams are dropped without advancing the monitor.
            Err(_e @ PacketError::CrcMismatch { .. }) => {
                debug!(error = %_e, "dropping corrupt datagram");
            }
            Err(e) => rx_sink.log(&format!("[rx] decode failed: {e}")),
        }
    });

    let manager = Rc::new(ThreadManager::start(
        endpoint,
        &config.worker,
        Some(rx_callback),
    )?);

    let mut event_loop = EventLoop::new()?;

    // TX timer: encode the next lifesign and hand it to the TX worker.
    let mut encoder = PacketEncoder::new(config.unique_id);
    let tx_manager = Rc::clone(&manager);
    let tx_sink = Arc::clone(&sink);
    let mut tx_buf = [0u8; MAX_PACKET_SIZE];
    event_loop.register_timer(PeriodicTimer::new(TX_INTERVAL)?, move || {
        match encoder.encode(TX_PAYLOAD, &mut tx_buf) {
            Ok(len) => {
                if tx_manager.enqueue_tx(&tx_buf[..len]) {
                    tx_sink.log(&format!(
                        "[tx] lifesign={} queued {len} bytes (queue={})",
                        encoder.lifesign(),
                        tx_manager.tx_queue_len(),
                    ));
                } else {
                    tx_sink.log("[tx] queue full, packet dropped");
                }
            }
            Err(e) => tx_sink.log(&format!("[tx] encode failed: {e}")),
        }
    })?;

    // Monitor timer: comm-loss check against the atomically published
    // lifesign-change stamp.
    let monitor_sink = Arc::clone(&sink);
    event_loop.register_timer(PeriodicTimer::new(MONITOR_INTERVAL)?, move || {
        if watch.is_lost() {
            monitor_sink.log(&format!(
                "[monitor] communication lost: no lifesign change for {} ms (threshold {} ms)",
                watch.ms_since_change(),
                watch.timeout().as_millis(),
            ));
        }
    })?;

    // Stats timer: snapshot the three histograms for the dashboard.
    let stats_manager = Rc::clone(&manager);
    let stats_sink = Arc::clone(&sink);
    event_loop.register_timer(PeriodicTimer::new(STATS_INTERVAL)?, move || {
        let tx = stats_manager.tx_latency().compute();
        let rx = stats_manager.rx_latency().compute();
        let interval = stats_manager.rx_interval().compute();
        stats_sink.update_dashboard(&tx, &rx, &interval);
    })?;

    event_loop.run(shutdown)?;

    info!("node shutting down");
    drop(event_loop); // releases the timer callbacks' manager handles
    manager.stop();

    sink.shutdown_summary(&ShutdownSummary {
        counts: manager.counts(),
        rx_latency: manager.rx_latency().compute(),
        tx_latency: manager.tx_latency().compute(),
        rx_interval: manager.rx_interval().compute(),
    });

    Ok(())
}
