//! pulselink node daemon.
//!
//! Runs one symmetric UDP lifesign peer. Start the same binary on both
//! nodes with mirrored addresses:
//!
//! ```sh
//! pulselink --src 192.168.1.10:5000 --dst 192.168.1.20:5000
//! pulselink --src 192.168.1.20:5000 --dst 192.168.1.10:5000
//! ```
//!
//! # Signals
//!
//! `SIGINT` / `SIGTERM`: graceful shutdown with a final statistics summary.
//! The handler only raises the shutdown flag; the interrupted timer poll on
//! the main thread picks it up.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use pulselink::app::{self, NodeConfig};
use pulselink::runtime::WorkerConfig;
use pulselink::sink::StdoutSink;

/// Default CPU core for the RX thread.
const RX_CPU_CORE: usize = 2;

/// Default CPU core for the TX thread.
const TX_CPU_CORE: usize = 3;

/// SCHED_FIFO priorities; RX outranks TX.
const RX_RT_PRIORITY: i32 = 80;
const TX_RT_PRIORITY: i32 = 70;

/// Process-wide shutdown flag raised by the signal handler.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_signal(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Release);
    // Only async-signal-safe calls are allowed here.
    const MSG: &[u8] = b"\npulselink: shutdown requested\n";
    // SAFETY: write(2) on stderr with a valid buffer is async-signal-safe.
    unsafe {
        libc::write(libc::STDERR_FILENO, MSG.as_ptr().cast(), MSG.len());
    }
}

fn install_signal_handlers() -> std::io::Result<()> {
    // SAFETY: the handler is an extern "C" fn that only performs
    // async-signal-safe operations (atomic store + write).
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handle_signal as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);

        for signal in [libc::SIGINT, libc::SIGTERM] {
            if libc::sigaction(signal, &action, std::ptr::null_mut()) != 0 {
                return Err(std::io::Error::last_os_error());
            }
        }
    }
    Ok(())
}

/// Extracts `--src` and `--dst`; any other token is ignored.
fn parse_args(args: &[String]) -> Option<(SocketAddr, SocketAddr)> {
    let mut src: Option<SocketAddr> = None;
    let mut dst: Option<SocketAddr> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--src" => {
                i += 1;
                src = args.get(i)?.parse().ok();
                src?;
            }
            "--dst" => {
                i += 1;
                dst = args.get(i)?.parse().ok();
                dst?;
            }
            _ => {}
        }
        i += 1;
    }

    Some((src?, dst?))
}

fn main() -> ExitCode {
    pulselink::init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let Some((src, dst)) = parse_args(&args) else {
        eprintln!("usage: {} --src <ipv4>:<port> --dst <ipv4>:<port>", args[0]);
        return ExitCode::from(2);
    };

    if let Err(e) = install_signal_handlers() {
        eprintln!("pulselink: failed to install signal handlers: {e}");
        return ExitCode::FAILURE;
    }

    let mut config = NodeConfig::new(src, dst);
    config.worker = WorkerConfig {
        rx_core: Some(RX_CPU_CORE),
        tx_core: Some(TX_CPU_CORE),
        rx_priority: RX_RT_PRIORITY,
        tx_priority: TX_RT_PRIORITY,
        realtime: true,
        ..WorkerConfig::default()
    };

    println!(
        "pulselink node\n  src {src}\n  dst {dst}\n  rx: core {RX_CPU_CORE}, prio {RX_RT_PRIORITY} (SCHED_FIFO)\n  tx: core {TX_CPU_CORE}, prio {TX_RT_PRIORITY} (SCHED_FIFO)",
    );

    match app::run(config, Arc::new(StdoutSink), &SHUTDOWN) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("pulselink: {e}");
            ExitCode::FAILURE
        }
    }
}
