//! Lifesign packet wire format and link-health monitoring.
//!
//! Wire layout (little-endian, `12 + N` bytes total for an `N`-byte payload):
//!
//! ```text
//! offset  size  field
//!      0     4  unique_id    sender identity, opaque
//!      4     2  lifesign     wrapping counter, +1 per encode
//!      6     2  data_length  N, must be <= 256
//!      8     N  data         opaque application bytes
//!  8 + N     4  crc32        IEEE CRC32 over bytes [0, 8 + N)
//! ```

pub mod monitor;
pub mod packet;

pub use monitor::{CommWatch, LinkError, LinkMonitor, MonitorConfig};
pub use packet::{PacketDecoder, PacketEncoder, PacketError, PacketView};

/// Maximum payload bytes per packet.
pub const MAX_DATA_SIZE: usize = 256;

/// Fixed header bytes: unique_id + lifesign + data_length.
pub const HEADER_SIZE: usize = 8;

/// Trailing CRC32 bytes.
pub const TRAILER_SIZE: usize = 4;

/// Smallest valid packet: empty payload.
pub const MIN_PACKET_SIZE: usize = HEADER_SIZE + TRAILER_SIZE;
