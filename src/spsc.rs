//! Lock-free single-producer/single-consumer packet queues.
//!
//! Two layers, split the same way as the index algorithm and its safe
//! wrapper:
//! - [`ring`]: the raw slot/index core with unsafe push/pop. Callers must
//!   uphold the SPSC invariant.
//! - [`queue`]: safe [`Producer`]/[`Consumer`] handles created by
//!   [`channel`], which encode the invariant in the type system
//!   (`Send + !Sync` ends).

pub mod queue;
pub mod ring;

pub use queue::{Consumer, Producer, channel};
pub use ring::{MAX_PACKET_SIZE, RING_CAPACITY};
