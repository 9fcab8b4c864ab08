//! Lifesign packet encoder/decoder.
//!
//! See [`crate::protocol`] for the byte layout. Fields are serialized
//! little-endian; the CRC32 (IEEE) covers everything before the trailer and
//! is itself stored little-endian.

use minstant::Instant;

use super::monitor::LinkMonitor;
use super::{HEADER_SIZE, MAX_DATA_SIZE, MIN_PACKET_SIZE, TRAILER_SIZE};

/// Codec error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("payload of {len} bytes exceeds the {MAX_DATA_SIZE}-byte limit")]
    DataTooLarge { len: usize },
    #[error("encode target of {available} bytes is smaller than the {needed}-byte packet")]
    BufferTooSmall { needed: usize, available: usize },
    #[error("truncated or inconsistent packet ({len} bytes, expected {expected})")]
    InvalidPacket { len: usize, expected: usize },
    #[error("CRC mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch { stored: u32, computed: u32 },
}

/// Borrowed view of a successfully decoded packet.
///
/// `payload` points into the caller's receive buffer and must be consumed
/// before that buffer is reused for the next receive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketView<'a> {
    pub unique_id: u32,
    pub lifesign: u16,
    pub payload: &'a [u8],
    pub crc32: u32,
}

/// TX-side packet builder. Owns the sender identity and the wrapping
/// lifesign counter, which advances once per successful encode.
pub struct PacketEncoder {
    unique_id: u32,
    lifesign: u16,
}

impl PacketEncoder {
    #[must_use]
    pub fn new(unique_id: u32) -> Self {
        Self {
            unique_id,
            lifesign: 0,
        }
    }

    /// The lifesign value the *next* encode will carry.
    #[must_use]
    pub fn lifesign(&self) -> u16 {
        self.lifesign
    }

    #[must_use]
    pub fn unique_id(&self) -> u32 {
        self.unique_id
    }

    /// Encodes `payload` into `out` and returns the packet length.
    ///
    /// The lifesign counter only advances when encoding succeeds.
    ///
    /// # Errors
    ///
    /// [`PacketError::DataTooLarge`] when the payload exceeds
    /// [`MAX_DATA_SIZE`]; [`PacketError::BufferTooSmall`] when `out` cannot
    /// hold header + payload + trailer.
    pub fn encode(&mut self, payload: &[u8], out: &mut [u8]) -> Result<usize, PacketError> {
        if payload.len() > MAX_DATA_SIZE {
            return Err(PacketError::DataTooLarge { len: payload.len() });
        }
        let total = HEADER_SIZE + payload.len() + TRAILER_SIZE;
        if out.len() < total {
            return Err(PacketError::BufferTooSmall {
                needed: total,
                available: out.len(),
            });
        }

        out[0..4].copy_from_slice(&self.unique_id.to_le_bytes());
        out[4..6].copy_from_slice(&self.lifesign.to_le_bytes());
        out[6..8].copy_from_slice(&(payload.len() as u16).to_le_bytes());
        out[HEADER_SIZE..HEADER_SIZE + payload.len()].copy_from_slice(payload);

        let crc = crc32fast::hash(&out[..HEADER_SIZE + payload.len()]);
        out[HEADER_SIZE + payload.len()..total].copy_from_slice(&crc.to_le_bytes());

        self.lifesign = self.lifesign.wrapping_add(1);
        Ok(total)
    }
}

/// RX-side packet parser with an embedded [`LinkMonitor`].
///
/// The monitor advances only on packets that pass all framing and CRC
/// checks. The decoder is single-owner state; in this crate it is confined
/// to the RX thread via the receive callback.
pub struct PacketDecoder {
    monitor: LinkMonitor,
    unique_id: u32,
    data_length: u16,
}

impl PacketDecoder {
    #[must_use]
    pub fn new(monitor: LinkMonitor) -> Self {
        Self {
            monitor,
            unique_id: 0,
            data_length: 0,
        }
    }

    /// Parses and verifies one packet, feeding the liveness monitor on
    /// success.
    ///
    /// # Errors
    ///
    /// [`PacketError::InvalidPacket`] on truncation,
    /// [`PacketError::DataTooLarge`] when the header claims more than
    /// [`MAX_DATA_SIZE`] payload bytes, [`PacketError::CrcMismatch`] when
    /// the recomputed CRC disagrees with the trailer. None of these advance
    /// the monitor.
    pub fn decode<'a>(&mut self, buf: &'a [u8]) -> Result<PacketView<'a>, PacketError> {
        if buf.len() < MIN_PACKET_SIZE {
            return Err(PacketError::InvalidPacket {
                len: buf.len(),
                expected: MIN_PACKET_SIZE,
            });
        }

        let unique_id = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let lifesign = u16::from_le_bytes([buf[4], buf[5]]);
        let data_length = u16::from_le_bytes([buf[6], buf[7]]);
        let n = usize::from(data_length);

        let expected = HEADER_SIZE + n + TRAILER_SIZE;
        if buf.len() < expected {
            return Err(PacketError::InvalidPacket {
                len: buf.len(),
                expected,
            });
        }
        if n > MAX_DATA_SIZE {
            return Err(PacketError::DataTooLarge { len: n });
        }

        let crc_bytes = &buf[HEADER_SIZE + n..expected];
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let computed = crc32fast::hash(&buf[..HEADER_SIZE + n]);
        if stored != computed {
            return Err(PacketError::CrcMismatch { stored, computed });
        }

        self.unique_id = unique_id;
        self.data_length = data_length;
        self.monitor.observe(lifesign, Instant::now());

        Ok(PacketView {
            unique_id,
            lifesign,
            payload: &buf[HEADER_SIZE..HEADER_SIZE + n],
            crc32: stored,
        })
    }

    /// Sender identity of the most recent successful decode.
    #[must_use]
    pub fn unique_id(&self) -> u32 {
        self.unique_id
    }

    /// Payload length of the most recent successful decode.
    #[must_use]
    pub fn data_length(&self) -> u16 {
        self.data_length
    }

    #[must_use]
    pub fn monitor(&self) -> &LinkMonitor {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut LinkMonitor {
        &mut self.monitor
    }
}
