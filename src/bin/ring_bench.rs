//! SPSC ring throughput and push/pop latency benchmark.
//!
//! Usage:
//!     cargo run --release --bin ring_bench
//!
//! Environment variables:
//!     PRODUCER_CPU=0  Pin the producer thread (default: unpinned)
//!     CONSUMER_CPU=2  Pin the consumer thread (default: unpinned)

use std::env;
use std::hint;
use std::sync::Arc;

use minstant::Instant;

use pulselink::spsc;
use pulselink::stats::LatencyHistogram;

const ITERATIONS: u32 = 1 << 22;
const PAYLOAD_LEN: usize = 64;

fn cpu_from_env(var: &str) -> Option<usize> {
    env::var(var).ok().and_then(|s| s.parse().ok())
}

fn pin(cpu: Option<usize>) {
    if let Some(id) = cpu {
        core_affinity::set_for_current(core_affinity::CoreId { id });
    }
}

fn main() {
    let producer_cpu = cpu_from_env("PRODUCER_CPU");
    let consumer_cpu = cpu_from_env("CONSUMER_CPU");

    let (tx, rx) = spsc::channel::<{ spsc::RING_CAPACITY }>();
    let push_latency = Arc::new(LatencyHistogram::new());
    let pop_latency = Arc::new(LatencyHistogram::new());

    let wall_start = Instant::now();

    let producer_hist = Arc::clone(&push_latency);
    let producer = std::thread::spawn(move || {
        pin(producer_cpu);
        let mut payload = [0u8; PAYLOAD_LEN];
        for i in 0..ITERATIONS {
            payload[..4].copy_from_slice(&i.to_le_bytes());
            let start = Instant::now();
            while !tx.push(&payload) {
                hint::spin_loop();
            }
            producer_hist.record_span(start, Instant::now());
        }
    });

    let consumer_hist = Arc::clone(&pop_latency);
    let consumer = std::thread::spawn(move || {
        pin(consumer_cpu);
        let mut buf = [0u8; PAYLOAD_LEN];
        for expected in 0..ITERATIONS {
            let start = Instant::now();
            loop {
                if let Some(len) = rx.pop(&mut buf) {
                    assert_eq!(len, PAYLOAD_LEN);
                    let got = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
                    assert_eq!(got, expected, "ring reordered or duplicated data");
                    break;
                }
                hint::spin_loop();
            }
            consumer_hist.record_span(start, Instant::now());
        }
    });

    producer.join().unwrap();
    consumer.join().unwrap();
    let elapsed = wall_start.elapsed();

    let rate = f64::from(ITERATIONS) / elapsed.as_secs_f64();
    println!(
        "{ITERATIONS} packets of {PAYLOAD_LEN} B in {:.3} s  ({:.2} M ops/s)",
        elapsed.as_secs_f64(),
        rate / 1e6,
    );
    print!("{}", push_latency.compute().render("push (incl. full-spin)"));
    print!("{}", pop_latency.compute().render("pop (incl. empty-spin)"));
}
