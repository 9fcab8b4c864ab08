//! Readiness multiplexer dispatching timer callbacks on the main thread.
//!
//! A thin wrapper over [`mio::Poll`]: each registered [`PeriodicTimer`]'s fd
//! is polled for readability and its callback is invoked synchronously from
//! [`EventLoop::run`]. The loop exits when its [`LoopStopper`] fires or the
//! embedding's shutdown flag goes up; a signal interrupting the poll wakes
//! the loop so both flags are rechecked promptly.

use std::io;
use std::os::fd::{AsFd, AsRawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

use super::timer::PeriodicTimer;
use crate::trace::debug;

/// Error from [`EventLoop`] operations.
#[derive(Debug, thiserror::Error)]
pub enum EventLoopError {
    #[error("failed to create poller: {0}")]
    Create(#[source] io::Error),
    #[error("failed to register timer fd: {0}")]
    Register(#[source] io::Error),
    #[error("poll failed: {0}")]
    Poll(#[source] io::Error),
}

/// Idempotent stop handle for a running [`EventLoop`].
///
/// Clonable and cheap; safe to fire from within a dispatched callback.
#[derive(Clone)]
pub struct LoopStopper(Arc<AtomicBool>);

impl LoopStopper {
    pub fn stop(&self) {
        self.0.store(false, Ordering::Release);
    }
}

struct TimerEntry {
    timer: PeriodicTimer,
    callback: Box<dyn FnMut()>,
}

impl TimerEntry {
    fn dispatch(&mut self) {
        // One callback invocation per readiness edge, regardless of how many
        // expirations accumulated while the loop was busy.
        if self.timer.drain() > 0 {
            (self.callback)();
        }
    }
}

/// Timer-driven event loop for the main thread.
pub struct EventLoop {
    poll: Poll,
    entries: Vec<TimerEntry>,
    running: Arc<AtomicBool>,
}

impl EventLoop {
    /// # Errors
    ///
    /// Returns [`EventLoopError::Create`] when the OS poller cannot be set
    /// up.
    pub fn new() -> Result<Self, EventLoopError> {
        let poll = Poll::new().map_err(EventLoopError::Create)?;
        Ok(Self {
            poll,
            entries: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Takes ownership of `timer` and invokes `callback` on each expiry.
    ///
    /// # Errors
    ///
    /// Returns [`EventLoopError::Register`] when the fd cannot be added to
    /// the poller.
    pub fn register_timer(
        &mut self,
        timer: PeriodicTimer,
        callback: impl FnMut() + 'static,
    ) -> Result<(), EventLoopError> {
        let token = Token(self.entries.len());
        let raw_fd = timer.as_fd().as_raw_fd();
        self.poll
            .registry()
            .register(&mut SourceFd(&raw_fd), token, Interest::READABLE)
            .map_err(EventLoopError::Register)?;

        self.entries.push(TimerEntry {
            timer,
            callback: Box::new(callback),
        });
        Ok(())
    }

    /// Returns a handle that stops the loop from a callback or another
    /// context.
    #[must_use]
    pub fn stopper(&self) -> LoopStopper {
        LoopStopper(Arc::clone(&self.running))
    }

    /// Blocks dispatching timer callbacks until stopped.
    ///
    /// Returns when the [`LoopStopper`] fires or `shutdown` is observed
    /// true. Interrupted polls (signal delivery) re-check both conditions
    /// and continue.
    ///
    /// # Errors
    ///
    /// Returns [`EventLoopError::Poll`] on a non-transient poller failure.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<(), EventLoopError> {
        let mut events = Events::with_capacity(16);

        while self.running.load(Ordering::Acquire) && !shutdown.load(Ordering::Acquire) {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(EventLoopError::Poll(e));
            }

            for event in &events {
                let Token(index) = event.token();
                if let Some(entry) = self.entries.get_mut(index) {
                    entry.dispatch();
                }
            }
        }

        debug!("event loop exiting");
        Ok(())
    }
}
