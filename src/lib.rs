//! pulselink: a symmetric UDP peer that exchanges framed, CRC-protected
//! lifesign datagrams at a fixed cadence while measuring send/receive latency
//! and arrival jitter at nanosecond resolution.
//!
//! # Architecture
//!
//! Three long-lived threads:
//! - **Main thread**: drives the timerfd [`event::EventLoop`] (periodic TX
//!   encode, communication monitor, statistics reporting).
//! - **RX thread**: blocking receive on the connected UDP socket, pushes
//!   datagrams into a lock-free SPSC ring and invokes the decode callback.
//! - **TX thread**: drains the TX ring and sends on the socket.
//!
//! The two rings ([`spsc`]) are the only channels between the threads; all
//! counters are relaxed atomics and all latency samples go into
//! single-producer [`stats::LatencyHistogram`] collectors that any thread may
//! snapshot.

pub mod app;
pub mod event;
pub mod net;
pub mod protocol;
pub mod runtime;
pub mod sink;
pub mod spsc;
pub mod stats;
pub mod trace;

pub use trace::init_tracing;
