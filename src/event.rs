//! Main-thread readiness multiplexing over timer file descriptors.

pub mod event_loop;
pub mod timer;

pub use event_loop::{EventLoop, EventLoopError, LoopStopper};
pub use timer::{PeriodicTimer, TimerError};
