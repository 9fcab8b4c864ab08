//! Safe `Producer`/`Consumer` handles over the raw SPSC ring.
//!
//! [`channel`] returns the two ends of a queue. Each end is [`Send`] but
//! **not** [`Sync`]: ownership can move to another thread, but a `&Producer`
//! can never be shared between threads, which is exactly the single-producer
//! single-consumer contract the raw ring requires.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

use super::ring::{RING_CAPACITY, Ring};

/// Marker type to opt out of `Sync` while remaining `Send`.
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Write end of a packet queue.
pub struct Producer<const N: usize = RING_CAPACITY> {
    ring: Arc<Ring<N>>,
    _unsync: PhantomUnsync,
}

/// Read end of a packet queue.
pub struct Consumer<const N: usize = RING_CAPACITY> {
    ring: Arc<Ring<N>>,
    _unsync: PhantomUnsync,
}

struct CapacityCheck<const N: usize>;

impl<const N: usize> CapacityCheck<N> {
    /// Compile-time assertion that the ring has at least one usable slot.
    const OK: () = assert!(N > 1, "queue capacity must be greater than 1");
}

/// Creates a new SPSC packet queue with `N` slots (`N - 1` usable).
///
/// # Example
///
/// ```
/// use pulselink::spsc;
///
/// let (tx, rx) = spsc::channel::<16>();
/// assert!(tx.push(b"hello"));
///
/// let mut buf = [0u8; 64];
/// assert_eq!(rx.pop(&mut buf), Some(5));
/// assert_eq!(&buf[..5], b"hello");
/// ```
#[must_use]
pub fn channel<const N: usize>() -> (Producer<N>, Consumer<N>) {
    let () = CapacityCheck::<N>::OK;

    let ring = Arc::new(Ring::new());

    let producer = Producer {
        ring: Arc::clone(&ring),
        _unsync: PhantomData,
    };

    let consumer = Consumer {
        ring,
        _unsync: PhantomData,
    };

    (producer, consumer)
}

impl<const N: usize> Producer<N> {
    /// Attempts to push one packet (wait-free).
    ///
    /// Returns `false` when the queue is full or `bytes` exceeds
    /// [`MAX_PACKET_SIZE`](super::MAX_PACKET_SIZE). The caller decides what
    /// to do with the rejected packet; the queue itself never blocks.
    #[inline]
    pub fn push(&self, bytes: &[u8]) -> bool {
        // SAFETY: `Producer` is !Sync and not Clone, so this thread is the
        // only producer. The ring is initialized during construction.
        unsafe { self.ring.push(bytes) }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }
}

impl<const N: usize> Consumer<N> {
    /// Attempts to pop one packet into `out` (wait-free).
    ///
    /// Returns the packet length, or `None` when the queue is empty or the
    /// stored packet does not fit in `out`.
    #[inline]
    #[must_use]
    pub fn pop(&self, out: &mut [u8]) -> Option<usize> {
        // SAFETY: `Consumer` is !Sync and not Clone, so this thread is the
        // only consumer. The ring is initialized during construction.
        unsafe { self.ring.pop(out) }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spsc::MAX_PACKET_SIZE;

    #[test]
    fn basic_push_pop() {
        let (tx, rx) = channel::<8>();
        let mut buf = [0u8; 16];

        assert!(tx.push(b"abc"));
        assert_eq!(rx.pop(&mut buf), Some(3));
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(rx.pop(&mut buf), None);
    }

    #[test]
    fn zero_length_packet_is_valid() {
        let (tx, rx) = channel::<8>();
        let mut buf = [0u8; 16];

        assert!(tx.push(&[]));
        assert_eq!(rx.pop(&mut buf), Some(0));
    }

    #[test]
    fn oversized_packet_is_rejected() {
        let (tx, rx) = channel::<8>();

        let too_big = vec![0u8; MAX_PACKET_SIZE + 1];
        assert!(!tx.push(&too_big));
        assert!(rx.is_empty());

        let exactly = vec![0xa5u8; MAX_PACKET_SIZE];
        assert!(tx.push(&exactly));
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        assert_eq!(rx.pop(&mut buf), Some(MAX_PACKET_SIZE));
        assert_eq!(buf, exactly);
    }

    #[test]
    fn pop_fails_when_out_buffer_too_small() {
        let (tx, rx) = channel::<8>();

        assert!(tx.push(b"0123456789"));
        let mut small = [0u8; 4];
        assert_eq!(rx.pop(&mut small), None);

        // The packet stays queued and can be popped with a big enough buffer.
        let mut big = [0u8; 32];
        assert_eq!(rx.pop(&mut big), Some(10));
    }

    #[test]
    fn full_at_capacity_minus_one() {
        let (tx, rx) = channel::<4>();

        for i in 0..3u8 {
            assert!(tx.push(&[i]), "push {i} should succeed");
        }
        assert!(tx.is_full());
        assert_eq!(tx.len(), 3);
        assert!(!tx.push(&[99]));

        let mut buf = [0u8; 4];
        assert_eq!(rx.pop(&mut buf), Some(1));
        assert!(tx.push(&[3]));
        assert!(!tx.push(&[99]));
    }

    #[test]
    fn size_observers() {
        let (tx, rx) = channel::<8>();
        let mut buf = [0u8; 4];

        assert!(tx.is_empty());
        assert_eq!(tx.len(), 0);

        for i in 0..5u8 {
            assert!(tx.push(&[i]));
        }
        assert_eq!(tx.len(), 5);
        assert_eq!(rx.len(), 5);

        assert_eq!(rx.pop(&mut buf), Some(1));
        assert_eq!(rx.len(), 4);
    }

    #[test]
    fn wrapping_preserves_fifo() {
        let (tx, rx) = channel::<4>();
        let mut buf = [0u8; 4];

        for round in 0..5u8 {
            for i in 0..3u8 {
                assert!(tx.push(&[round * 10 + i]));
            }
            for i in 0..3u8 {
                assert_eq!(rx.pop(&mut buf), Some(1));
                assert_eq!(buf[0], round * 10 + i);
            }
            assert_eq!(rx.pop(&mut buf), None);
        }
    }

    #[test]
    fn overflow_rejects_exactly_capacity_minus_one_short() {
        let (tx, _rx) = channel::<{ RING_CAPACITY }>();

        let mut accepted = 0u32;
        for i in 0..2000u32 {
            if tx.push(&i.to_le_bytes()) {
                accepted += 1;
            }
        }
        assert_eq!(accepted, (RING_CAPACITY - 1) as u32);
    }

    #[test]
    fn concurrent_pop_sequence_is_prefix_of_push_sequence() {
        let (tx, rx) = channel::<64>();
        let count = 10_000u32;

        let producer = std::thread::spawn(move || {
            for i in 0..count {
                while !tx.push(&i.to_le_bytes()) {
                    std::hint::spin_loop();
                }
            }
        });

        let consumer = std::thread::spawn(move || {
            let mut buf = [0u8; 8];
            let mut received = Vec::with_capacity(count as usize);
            while received.len() < count as usize {
                if let Some(len) = rx.pop(&mut buf) {
                    assert_eq!(len, 4);
                    received.push(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]));
                } else {
                    std::hint::spin_loop();
                }
            }
            received
        });

        producer.join().unwrap();
        let received = consumer.join().unwrap();

        // No reorder, no duplication.
        for (i, &val) in received.iter().enumerate() {
            assert_eq!(val, i as u32);
        }
    }

    #[test]
    fn handles_move_across_threads() {
        let (tx, rx) = channel::<16>();

        let handle = std::thread::spawn(move || {
            for i in 0..10u8 {
                assert!(tx.push(&[i]));
            }
        });
        handle.join().unwrap();

        let mut buf = [0u8; 4];
        for i in 0..10u8 {
            assert_eq!(rx.pop(&mut buf), Some(1));
            assert_eq!(buf[0], i);
        }
    }
}
