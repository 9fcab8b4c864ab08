//! Periodic monotonic timer backed by a Linux timerfd.

use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::time::Duration;

use rustix::time::{
    Itimerspec, TimerfdClockId, TimerfdFlags, TimerfdTimerFlags, Timespec, timerfd_create,
    timerfd_settime,
};

/// Error creating or arming a [`PeriodicTimer`].
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    #[error("failed to create timerfd: {0}")]
    Create(#[source] std::io::Error),
    #[error("failed to arm timerfd with a {interval:?} period: {source}")]
    Arm {
        interval: Duration,
        #[source]
        source: std::io::Error,
    },
}

/// A monotonic timer firing every `interval`, exposed as a pollable fd.
///
/// The fd becomes readable on expiry; [`PeriodicTimer::drain`] consumes the
/// accumulated expiration count so a slow consumer observes one readiness
/// edge per drain rather than one per missed period.
pub struct PeriodicTimer {
    fd: OwnedFd,
    interval: Duration,
}

impl PeriodicTimer {
    /// Creates and arms a periodic timer.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError`] when the timerfd cannot be created or armed.
    pub fn new(interval: Duration) -> Result<Self, TimerError> {
        let fd = timerfd_create(
            TimerfdClockId::Monotonic,
            TimerfdFlags::NONBLOCK | TimerfdFlags::CLOEXEC,
        )
        .map_err(|errno| TimerError::Create(errno.into()))?;

        let period = timespec_of(interval);
        let spec = Itimerspec {
            it_interval: period,
            it_value: period,
        };
        timerfd_settime(&fd, TimerfdTimerFlags::empty(), &spec).map_err(|errno| {
            TimerError::Arm {
                interval,
                source: errno.into(),
            }
        })?;

        Ok(Self { fd, interval })
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Reads and discards the accumulated expiration count.
    ///
    /// Returns 0 when the timer has not expired since the last drain.
    pub(crate) fn drain(&self) -> u64 {
        let mut buf = [0u8; 8];
        match rustix::io::read(&self.fd, &mut buf) {
            Ok(8) => u64::from_ne_bytes(buf),
            _ => 0,
        }
    }
}

impl AsFd for PeriodicTimer {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

fn timespec_of(d: Duration) -> Timespec {
    Timespec {
        tv_sec: d.as_secs() as _,
        tv_nsec: d.subsec_nanos() as _,
    }
}
