//! Core lock-free SPSC ring buffer algorithm over fixed-size packet slots.
//!
//! The ring holds `N` slots of `{ len, payload[MAX_PACKET_SIZE] }`. Indices
//! are kept modulo `N`: the queue is empty when `write == read` and full when
//! `(write + 1) % N == read`, so usable capacity is `N - 1` slots.
//!
//! # Safety
//!
//! `push`/`pop` are unsafe because they require the caller to uphold the SPSC
//! invariant: exactly one producer and one consumer, with no concurrent
//! access to either role. The safe wrapper lives in [`crate::spsc::queue`].

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Largest payload a single slot can carry.
pub const MAX_PACKET_SIZE: usize = 2048;

/// Slot count of the RX and TX rings (usable capacity is one less).
pub const RING_CAPACITY: usize = 1024;

/// A single fixed-size slot.
#[repr(C)]
pub struct Slot {
    len: u16,
    payload: [u8; MAX_PACKET_SIZE],
}

impl Slot {
    fn zeroed() -> Self {
        Self {
            len: 0,
            payload: [0u8; MAX_PACKET_SIZE],
        }
    }
}

/// Producer-owned write index, alone on its cache line so the producer's
/// publication stores never false-share with the consumer's.
#[repr(align(64))]
struct WriteIndex(AtomicUsize);

/// Consumer-owned read index, likewise isolated.
#[repr(align(64))]
struct ReadIndex(AtomicUsize);

/// Raw SPSC ring over packet slots.
///
/// Slot storage is a boxed slice so that constructing a ring never moves the
/// multi-megabyte buffer through a thread stack.
pub struct Ring<const N: usize> {
    write: WriteIndex,
    read: ReadIndex,
    slots: Box<[UnsafeCell<Slot>]>,
}

// SAFETY: concurrent access to the slots is mediated by the atomic indices.
// A slot is written only between the producer's index check and its release
// store of `write`, and read only between the consumer's acquire load of
// `write` and its release store of `read`; the SPSC invariant guarantees the
// two windows never overlap for the same slot.
unsafe impl<const N: usize> Send for Ring<N> {}
unsafe impl<const N: usize> Sync for Ring<N> {}

impl<const N: usize> Ring<N> {
    pub fn new() -> Self {
        let slots: Box<[UnsafeCell<Slot>]> =
            (0..N).map(|_| UnsafeCell::new(Slot::zeroed())).collect();
        Self {
            write: WriteIndex(AtomicUsize::new(0)),
            read: ReadIndex(AtomicUsize::new(0)),
            slots,
        }
    }

    /// Advances an index to the next slot, wrapping to 0 at capacity.
    ///
    /// Equivalent to `(idx + 1) % N` without the division.
    #[inline]
    const fn bump(idx: usize) -> usize {
        let next = idx + 1;
        if next == N { 0 } else { next }
    }

    /// Attempts to push one packet onto the queue.
    ///
    /// Fails when `bytes` exceeds [`MAX_PACKET_SIZE`] or the queue is full.
    /// The slot contents are fully written before the write index is
    /// published with release ordering.
    ///
    /// # Safety
    ///
    /// Caller must be the single producer.
    #[inline]
    pub unsafe fn push(&self, bytes: &[u8]) -> bool {
        if bytes.len() > MAX_PACKET_SIZE {
            return false;
        }

        // Producer-local index; relaxed is fine.
        let write = self.write.0.load(Ordering::Relaxed);
        let next = Self::bump(write);

        // Acquire pairs with the consumer's release store of `read`, so the
        // slot we are about to overwrite has been fully read.
        if next == self.read.0.load(Ordering::Acquire) {
            return false; // full
        }

        // SAFETY: the producer owns the slot at `write` until the release
        // store below publishes it; `write` is in [0, N) by construction.
        unsafe {
            let slot = &mut *self.slots[write].get();
            slot.len = bytes.len() as u16;
            slot.payload[..bytes.len()].copy_from_slice(bytes);
        }

        // Release pairs with the consumer's acquire load of `write`,
        // ordering the payload writes before the publication.
        self.write.0.store(next, Ordering::Release);
        true
    }

    /// Attempts to pop one packet into `out`, returning its length.
    ///
    /// Returns `None` when the queue is empty or when the stored packet does
    /// not fit in `out`. The payload is fully copied out before the read
    /// index is published with release ordering.
    ///
    /// # Safety
    ///
    /// Caller must be the single consumer.
    #[inline]
    pub unsafe fn pop(&self, out: &mut [u8]) -> Option<usize> {
        // Consumer-local index; relaxed is fine.
        let read = self.read.0.load(Ordering::Relaxed);

        // Acquire pairs with the producer's release store of `write`.
        if read == self.write.0.load(Ordering::Acquire) {
            return None; // empty
        }

        // SAFETY: the consumer owns the slot at `read` until the release
        // store below frees it; `read` is in [0, N) by construction.
        let len = unsafe {
            let slot = &*self.slots[read].get();
            let len = usize::from(slot.len);
            if len > out.len() {
                return None;
            }
            out[..len].copy_from_slice(&slot.payload[..len]);
            len
        };

        // Release pairs with the producer's acquire load of `read`,
        // ordering the payload reads before the slot is reusable.
        self.read.0.store(Self::bump(read), Ordering::Release);
        Some(len)
    }

    /// Number of queued packets.
    ///
    /// Exact only under single-ended quiescence; a concurrent producer or
    /// consumer can change the result before it is observed.
    pub fn len(&self) -> usize {
        let w = self.write.0.load(Ordering::Acquire);
        let r = self.read.0.load(Ordering::Acquire);
        if w >= r { w - r } else { N - r + w }
    }

    pub fn is_empty(&self) -> bool {
        self.write.0.load(Ordering::Acquire) == self.read.0.load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        let next = Self::bump(self.write.0.load(Ordering::Acquire));
        next == self.read.0.load(Ordering::Acquire)
    }
}

impl<const N: usize> Default for Ring<N> {
    fn default() -> Self {
        Self::new()
    }
}
