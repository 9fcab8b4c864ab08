//! Best-effort worker-thread tuning: signal masks, CPU pinning, SCHED_FIFO.
//!
//! Everything here is called from the worker's own prologue. Pinning and
//! scheduling failures are logged and ignored; a node without
//! `CAP_SYS_NICE` or isolated cores still runs, just at default scheduling.

use nix::sys::signal::{SigSet, Signal};

use crate::trace::{debug, warn};

/// Blocks SIGINT and SIGTERM on the calling thread so process shutdown
/// signals are only ever delivered to the main thread.
pub(crate) fn block_shutdown_signals() {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGINT);
    mask.add(Signal::SIGTERM);
    if let Err(errno) = mask.thread_block() {
        warn!(error = %errno, "failed to block shutdown signals on worker thread");
    }
}

/// Applies the optional core pin and real-time priority to the calling
/// thread. Never fails; misconfiguration degrades to default scheduling.
pub(crate) fn configure_thread(name: &str, core: Option<usize>, priority: i32, realtime: bool) {
    if let Some(id) = core {
        if core_affinity::set_for_current(core_affinity::CoreId { id }) {
            debug!(thread = name, core = id, "pinned worker to core");
        } else {
            warn!(thread = name, core = id, "failed to pin worker to core");
        }
    }

    if realtime && priority > 0 {
        match set_fifo_priority(priority) {
            Ok(()) => debug!(thread = name, priority, "SCHED_FIFO applied"),
            Err(error) => warn!(
                thread = name,
                priority,
                %error,
                "failed to set SCHED_FIFO (needs CAP_SYS_NICE); continuing at default scheduling"
            ),
        }
    }
}

/// Switches the calling thread to SCHED_FIFO at the given priority (1-99).
#[cfg(target_os = "linux")]
fn set_fifo_priority(priority: i32) -> std::io::Result<()> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: pid 0 targets the calling thread; `param` is a valid,
    // initialized sched_param for the duration of the call.
    let rc = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_fifo_priority(_priority: i32) -> std::io::Result<()> {
    Ok(())
}
