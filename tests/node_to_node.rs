//! End-to-end tests: two symmetric nodes exchanging lifesign datagrams over
//! loopback.
//!
//! Each test wires real sockets, real worker threads, and real timerfds; the
//! only double is the collecting sink. Ports are fixed per test so the tests
//! can run in parallel.
//!
//! Run with log output:
//! ```bash
//! RUST_LOG=pulselink=debug cargo test --test node_to_node -- --nocapture
//! ```

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, Once};
use std::thread;
use std::time::Duration;

use pulselink::app::{self, NodeConfig};
use pulselink::protocol::PacketEncoder;
use pulselink::sink::{ShutdownSummary, Sink};
use pulselink::stats::LatencyReport;

static INIT_TRACING: Once = Once::new();

fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        pulselink::init_tracing();
    });
}

fn localhost(port: u16) -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
}

/// Sink recording everything the node emits.
#[derive(Default)]
struct CollectSink {
    lines: Mutex<Vec<String>>,
    dashboards: Mutex<Vec<(LatencyReport, LatencyReport, LatencyReport)>>,
    summary: Mutex<Option<ShutdownSummary>>,
}

impl CollectSink {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    fn dashboard_count(&self) -> usize {
        self.dashboards.lock().unwrap().len()
    }

    fn summary(&self) -> ShutdownSummary {
        self.summary.lock().unwrap().expect("no shutdown summary emitted")
    }
}

impl Sink for CollectSink {
    fn log(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    fn update_dashboard(&self, tx: &LatencyReport, rx: &LatencyReport, interval: &LatencyReport) {
        self.dashboards.lock().unwrap().push((*tx, *rx, *interval));
    }

    fn shutdown_summary(&self, summary: &ShutdownSummary) {
        *self.summary.lock().unwrap() = Some(*summary);
    }
}

/// Node config with pinning and SCHED_FIFO off so the tests run anywhere.
fn node_config(src: SocketAddr, dst: SocketAddr, unique_id: u32) -> NodeConfig {
    let mut config = NodeConfig::new(src, dst);
    config.unique_id = unique_id;
    config
}

#[test]
fn two_nodes_exchange_lifesigns() {
    init_test_tracing();

    let addr_a = localhost(47201);
    let addr_b = localhost(47202);
    let sink_a = Arc::new(CollectSink::default());
    let sink_b = Arc::new(CollectSink::default());
    let shutdown = AtomicBool::new(false);

    thread::scope(|s| {
        let node_a = s.spawn(|| {
            app::run(
                node_config(addr_a, addr_b, 0xaaaa_0001),
                Arc::clone(&sink_a) as Arc<dyn Sink>,
                &shutdown,
            )
        });
        let node_b = s.spawn(|| {
            app::run(
                node_config(addr_b, addr_a, 0xbbbb_0002),
                Arc::clone(&sink_b) as Arc<dyn Sink>,
                &shutdown,
            )
        });

        thread::sleep(Duration::from_millis(2600));
        shutdown.store(true, Ordering::Release);

        node_a.join().unwrap().unwrap();
        node_b.join().unwrap().unwrap();
    });

    for (name, sink, peer_id) in [
        ("A", &sink_a, 0xbbbb_0002u32),
        ("B", &sink_b, 0xaaaa_0001u32),
    ] {
        let summary = sink.summary();
        assert!(
            summary.counts.tx_packets >= 15,
            "{name}: tx_packets = {}",
            summary.counts.tx_packets
        );
        assert!(
            summary.counts.rx_packets >= 15,
            "{name}: rx_packets = {}",
            summary.counts.rx_packets
        );
        assert_eq!(summary.counts.rx_drops, 0, "{name}: rx drops");
        assert_eq!(summary.counts.tx_drops, 0, "{name}: tx drops");

        // Latency collectors saw the traffic.
        assert!(summary.rx_latency.count >= 15, "{name}: rx latency samples");
        assert!(summary.tx_latency.count >= 15, "{name}: tx latency samples");
        assert!(summary.rx_interval.count >= 14, "{name}: interval samples");
        // Inter-arrival p50 should sit near the 100 ms cadence.
        assert!(
            (summary.rx_interval.p50_us - 100_000.0).abs() < 20_000.0,
            "{name}: interval p50 = {} us",
            summary.rx_interval.p50_us
        );

        let lines = sink.lines();
        let expected_id = format!("{peer_id:#010x}");
        assert!(
            lines.iter().any(|l| l.starts_with("[rx]") && l.contains(&expected_id)),
            "{name}: no rx record naming peer {expected_id}"
        );
        assert!(
            !lines.iter().any(|l| l.contains("communication lost")),
            "{name}: spurious comm-lost report"
        );

        assert!(sink.dashboard_count() >= 5, "{name}: dashboards");
    }
}

#[test]
fn lone_node_survives_until_peer_appears() {
    init_test_tracing();

    let addr_a = localhost(47211);
    let addr_b = localhost(47212);
    let sink_a = Arc::new(CollectSink::default());
    let sink_b = Arc::new(CollectSink::default());
    let shutdown = AtomicBool::new(false);

    thread::scope(|s| {
        let node_a = s.spawn(|| {
            app::run(
                node_config(addr_a, addr_b, 0xaaaa_0011),
                Arc::clone(&sink_a) as Arc<dyn Sink>,
                &shutdown,
            )
        });

        // A transmits into ICMP port-unreachable territory for a full
        // second before B exists.
        thread::sleep(Duration::from_millis(1000));

        let node_b = s.spawn(|| {
            app::run(
                node_config(addr_b, addr_a, 0xbbbb_0012),
                Arc::clone(&sink_b) as Arc<dyn Sink>,
                &shutdown,
            )
        });

        thread::sleep(Duration::from_millis(1500));
        shutdown.store(true, Ordering::Release);

        node_a.join().unwrap().unwrap();
        node_b.join().unwrap().unwrap();
    });

    let summary_a = sink_a.summary();
    // A kept transmitting the whole time, including the lonely second
    // (a few sends may pick up the pending ICMP error and count as drops).
    assert!(
        summary_a.counts.tx_packets >= 18,
        "A: tx_packets = {}",
        summary_a.counts.tx_packets
    );
    // A's RX worker rode out the refused receives and then decoded B.
    assert!(
        summary_a.counts.rx_packets >= 8,
        "A: rx_packets = {}",
        summary_a.counts.rx_packets
    );
    assert!(
        sink_a.lines().iter().any(|l| l.starts_with("[rx]")),
        "A never decoded a packet from B"
    );

    let summary_b = sink_b.summary();
    assert!(
        summary_b.counts.rx_packets >= 8,
        "B: rx_packets = {}",
        summary_b.counts.rx_packets
    );
}

#[test]
fn corrupt_datagrams_do_not_disturb_the_stream() {
    init_test_tracing();

    let addr_a = localhost(47221);
    let addr_b = localhost(47222);
    let sink_a = Arc::new(CollectSink::default());
    let shutdown = AtomicBool::new(false);

    thread::scope(|s| {
        let node_a = s.spawn(|| {
            app::run(
                node_config(addr_a, addr_b, 0xaaaa_0021),
                Arc::clone(&sink_a) as Arc<dyn Sink>,
                &shutdown,
            )
        });

        // The peer is scripted: it owns B's address so its datagrams pass
        // A's connected-socket filter, and it interleaves a CRC-flipped
        // copy between the valid lifesigns.
        let peer = s.spawn(|| {
            let socket = UdpSocket::bind(addr_b).unwrap();
            socket.connect(addr_a).unwrap();

            // Let A finish binding; early sends racing it would surface the
            // ICMP refusal on this socket.
            thread::sleep(Duration::from_millis(100));

            let mut encoder = PacketEncoder::new(0xbbbb_0022);
            let mut frame = [0u8; 64];
            for i in 0..20u32 {
                let len = encoder.encode(b"scripted peer", &mut frame).unwrap();
                let _ = socket.send(&frame[..len]);

                if i % 4 == 0 {
                    let mut corrupted = frame;
                    corrupted[len - 1] ^= 0xff;
                    let _ = socket.send(&corrupted[..len]);
                }
                thread::sleep(Duration::from_millis(100));
            }
        });

        peer.join().unwrap();
        shutdown.store(true, Ordering::Release);
        node_a.join().unwrap().unwrap();
    });

    let summary_a = sink_a.summary();
    let lines_a = sink_a.lines();

    // All 25 datagrams (20 valid + 5 corrupt) arrive as raw packets, give
    // or take the first exchanges racing A's bind.
    assert!(
        summary_a.counts.rx_packets >= 22,
        "A: rx_packets = {}",
        summary_a.counts.rx_packets
    );
    // CRC rejects are silent drops that never reach the record stream.
    assert!(
        !lines_a.iter().any(|l| l.contains("decode failed")),
        "CRC mismatch must not surface as a decode-failure record"
    );
    let decoded = lines_a
        .iter()
        .filter(|l| l.starts_with("[rx]") && l.contains("0xbbbb0022"))
        .count();
    assert!(
        (15..=20).contains(&decoded),
        "expected only the 20 valid frames to decode, saw {decoded}"
    );
}
