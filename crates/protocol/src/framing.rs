//! Wire framing constants and the packet header layout
//!
//! The bulk IN endpoint carries a stream of frames, each made of a fixed-size
//! header immediately followed by its payload:
//! ```text
//! [Magic: u32][DataSize: u32][Timestamp (usecs): u64][Payload: DataSize bytes]
//! ```
//! All header fields are little-endian. The transport layer only needs
//! [`HEADER_LEN`] and [`MAX_TRANSFER_SIZE`]; [`PacketHeader`] is for consumers
//! that need the payload length.

use crate::error::{ProtocolError, Result};
use byteorder::{ByteOrder, LittleEndian};

/// Length of a packet header in bytes
pub const HEADER_LEN: usize = 16;

/// Largest video payload the peripheral sends in one packet
pub const MAX_VIDEO_PAYLOAD: usize = 0x50000;

/// Audio buffer size on the peripheral
const AUDIO_BUFFER_SIZE: usize = 0x1000;

/// Number of audio buffers batched into one packet
const AUDIO_BATCHING: usize = 2;

/// Largest audio payload the peripheral sends in one packet
pub const MAX_AUDIO_PAYLOAD: usize = AUDIO_BUFFER_SIZE * AUDIO_BATCHING;

/// Maximum size of a single USB transfer (one header plus the largest payload)
pub const MAX_TRANSFER_SIZE: usize = HEADER_LEN + MAX_VIDEO_PAYLOAD;

/// Header magic marking a video packet
pub const PACKET_MAGIC_VIDEO: u32 = 0xDDDD_DDDD;

/// Header magic marking an audio packet
pub const PACKET_MAGIC_AUDIO: u32 = 0xEEEE_EEEE;

/// Kind of payload announced by a packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Video,
    Audio,
}

impl PacketKind {
    pub const fn magic(self) -> u32 {
        match self {
            PacketKind::Video => PACKET_MAGIC_VIDEO,
            PacketKind::Audio => PACKET_MAGIC_AUDIO,
        }
    }

    pub const fn max_payload(self) -> usize {
        match self {
            PacketKind::Video => MAX_VIDEO_PAYLOAD,
            PacketKind::Audio => MAX_AUDIO_PAYLOAD,
        }
    }

    fn from_magic(magic: u32) -> Option<Self> {
        match magic {
            PACKET_MAGIC_VIDEO => Some(PacketKind::Video),
            PACKET_MAGIC_AUDIO => Some(PacketKind::Audio),
            _ => None,
        }
    }
}

/// Decoded packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub kind: PacketKind,
    pub data_size: u32,
    pub timestamp_us: u64,
}

impl PacketHeader {
    /// Parse a header from the first [`HEADER_LEN`] bytes of `bytes`
    ///
    /// # Example
    /// ```
    /// use protocol::{PacketHeader, PacketKind, HEADER_LEN};
    ///
    /// let header = PacketHeader { kind: PacketKind::Audio, data_size: 32, timestamp_us: 7 };
    /// let mut bytes = [0u8; HEADER_LEN];
    /// header.write(&mut bytes);
    /// assert_eq!(PacketHeader::parse(&bytes).unwrap(), header);
    /// ```
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtocolError::HeaderTooShort {
                needed: HEADER_LEN,
                available: bytes.len(),
            });
        }

        let magic = LittleEndian::read_u32(&bytes[0..4]);
        let kind = PacketKind::from_magic(magic).ok_or(ProtocolError::UnknownMagic(magic))?;

        let data_size = LittleEndian::read_u32(&bytes[4..8]);
        if data_size as usize > kind.max_payload() {
            return Err(ProtocolError::PayloadTooLarge {
                size: data_size as usize,
                max: kind.max_payload(),
            });
        }

        let timestamp_us = LittleEndian::read_u64(&bytes[8..16]);

        Ok(Self {
            kind,
            data_size,
            timestamp_us,
        })
    }

    /// Write this header into the first [`HEADER_LEN`] bytes of `out`
    ///
    /// Panics if `out` is shorter than [`HEADER_LEN`].
    pub fn write(&self, out: &mut [u8]) {
        LittleEndian::write_u32(&mut out[0..4], self.kind.magic());
        LittleEndian::write_u32(&mut out[4..8], self.data_size);
        LittleEndian::write_u64(&mut out[8..16], self.timestamp_us);
    }

    /// Payload length as a buffer size
    pub fn payload_len(&self) -> usize {
        self.data_size as usize
    }
}
