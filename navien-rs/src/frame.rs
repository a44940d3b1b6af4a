//! Navien bus frame layout
//!
//! ```text
//!  0       1        2          3            4         5     6 .. 6+len   6+len
//! +------+--------+----------+------------+----------+-----+-----------+----------+
//! | 0xF7 | version| direction| packet_type| reserved | len |  payload  | checksum |
//! +------+--------+----------+------------+----------+-----+-----------+----------+
//! ```
//!
//! `len` counts the payload bytes that follow the header, not including the
//! trailing checksum. The checksum covers the header and payload and uses the
//! seed of the frame's [`Direction`].

use std::fmt;

use crate::checksum::{checksum, CONTROL_SEED, STATUS_SEED};
use crate::error::LinkError;

/// Start-of-frame marker byte.
pub const PACKET_MARKER: u8 = 0xF7;

/// Fixed header size.
pub const HEADER_SIZE: usize = 6;

/// Capacity of a single frame buffer, header and checksum included.
pub const FRAME_CAPACITY: usize = 128;

/// Largest payload length that still fits in a frame buffer.
pub const MAX_PAYLOAD_LEN: usize = FRAME_CAPACITY - HEADER_SIZE - 1;

/// Length value seen when the A/B lines are swapped.
pub const INVALID_LENGTH: u8 = 0xFF;

/// First status packet type of the water sub-device range.
pub const WATER_TYPE_MIN: u8 = 0x50;
/// Last status packet type of the water sub-device range.
pub const WATER_TYPE_MAX: u8 = 0x5F;
/// Number of water sub-devices addressable on one bus.
pub const WATER_DEVICE_COUNT: usize = (WATER_TYPE_MAX - WATER_TYPE_MIN) as usize + 1;
/// Status packet type of the gas packet.
pub const GAS_TYPE: u8 = 0x0F;

/// Control cmd_type of a gateway announce.
pub const CONTROL_ANNOUNCE: u8 = 0x4A;
/// Control cmd_type of a command.
pub const CONTROL_COMMAND: u8 = 0x4F;

/// Leading payload byte of a water status packet.
pub const WATER_SUBTYPE: u8 = 0x42;
/// Leading payload byte of a gas status packet.
pub const GAS_SUBTYPE: u8 = 0x45;

// Header field offsets
const OFF_MARKER: usize = 0;
const OFF_VERSION: usize = 1;
const OFF_DIRECTION: usize = 2;
const OFF_PACKET_TYPE: usize = 3;
const OFF_RESERVED: usize = 4;
const OFF_LEN: usize = 5;

/// Which way a frame travels on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    /// Observer or peer to heater
    Control = 0x0F,
    /// Heater to observer
    Status = 0x50,
}

impl Direction {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0F => Some(Self::Control),
            0x50 => Some(Self::Status),
            _ => None,
        }
    }

    /// Checksum seed for frames in this direction.
    pub fn seed(&self) -> u8 {
        match self {
            Direction::Control => CONTROL_SEED,
            Direction::Status => STATUS_SEED,
        }
    }
}

/// Decoded packet kind, after direction and type dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Water status of one sub-device
    Water { device_index: u8 },
    /// Gas status
    Gas,
    /// Gateway announce
    Announce,
    /// Control command
    Command,
}

impl PacketKind {
    /// Classify a frame by direction, header type and (for control frames)
    /// the first payload byte.
    pub fn classify(direction: Direction, packet_type: u8, cmd_type: Option<u8>) -> Option<Self> {
        match direction {
            Direction::Status => match packet_type {
                WATER_TYPE_MIN..=WATER_TYPE_MAX => Some(PacketKind::Water {
                    device_index: packet_type - WATER_TYPE_MIN,
                }),
                GAS_TYPE => Some(PacketKind::Gas),
                _ => None,
            },
            Direction::Control => match cmd_type? {
                CONTROL_ANNOUNCE => Some(PacketKind::Announce),
                CONTROL_COMMAND => Some(PacketKind::Command),
                _ => None,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PacketKind::Water { .. } => "water",
            PacketKind::Gas => "gas",
            PacketKind::Announce => "announce",
            PacketKind::Command => "command",
        }
    }
}

/// Frame header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub direction: u8,
    pub packet_type: u8,
    pub reserved: u8,
    /// Payload length, checksum excluded
    pub len: u8,
}

impl Header {
    /// Parse a header from the first [`HEADER_SIZE`] bytes of `bytes`.
    ///
    /// Returns `None` if there are not enough bytes or the marker is missing.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let header = bytes.get(..HEADER_SIZE)?;
        if header[OFF_MARKER] != PACKET_MARKER {
            return None;
        }
        Some(Self {
            version: header[OFF_VERSION],
            direction: header[OFF_DIRECTION],
            packet_type: header[OFF_PACKET_TYPE],
            reserved: header[OFF_RESERVED],
            len: header[OFF_LEN],
        })
    }

    /// Check the declared length against the sentinel and the buffer size.
    pub fn validate(&self) -> Result<(), LinkError> {
        if self.len == INVALID_LENGTH {
            return Err(LinkError::InvalidLength);
        }
        if self.len as usize > MAX_PAYLOAD_LEN {
            return Err(LinkError::BufferTooSmall {
                len: self.len as usize,
            });
        }
        Ok(())
    }

    /// Bytes still to read after the header: payload plus checksum.
    pub fn remaining_len(&self) -> usize {
        self.len as usize + 1
    }

    /// Whole frame length: header, payload and checksum.
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.remaining_len()
    }

    pub fn direction(&self) -> Option<Direction> {
        Direction::from_u8(self.direction)
    }
}

/// One packet as it appears on the wire.
///
/// Backed by a fixed [`FRAME_CAPACITY`] buffer; the valid length is tracked
/// separately, so accessors never read past the bytes actually received.
#[derive(Clone, Copy)]
pub struct RawFrame {
    buf: [u8; FRAME_CAPACITY],
    len: usize,
}

impl Default for RawFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl RawFrame {
    pub const fn new() -> Self {
        Self {
            buf: [0; FRAME_CAPACITY],
            len: 0,
        }
    }

    /// Copy `bytes` into a new frame.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LinkError> {
        let mut frame = Self::new();
        let dst = frame.region_mut(0, bytes.len())?;
        dst.copy_from_slice(bytes);
        Ok(frame)
    }

    /// Valid bytes of the frame
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn header(&self) -> Option<Header> {
        Header::parse(self.as_bytes())
    }

    /// Payload bytes as declared by the header, clipped to what was received.
    pub fn payload(&self) -> &[u8] {
        let declared = self.header().map(|h| h.len as usize).unwrap_or(0);
        let end = (HEADER_SIZE + declared).min(self.len);
        self.buf.get(HEADER_SIZE..end).unwrap_or(&[])
    }

    /// Trailing checksum byte, if the frame is complete.
    pub fn checksum_byte(&self) -> Option<u8> {
        let header = self.header()?;
        self.as_bytes().get(HEADER_SIZE + header.len as usize).copied()
    }

    /// Verify the trailing checksum against the frame's direction seed.
    ///
    /// Returns the direction on success.
    pub fn verify(&self) -> Result<Direction, LinkError> {
        let header = self.header().ok_or(LinkError::BufferTooSmall { len: self.len })?;
        let direction = header.direction().ok_or_else(|| LinkError::UnknownDirection {
            direction: header.direction,
            raw: self.as_bytes().to_vec(),
        })?;
        let body_end = HEADER_SIZE + header.len as usize;
        let received = self
            .checksum_byte()
            .ok_or(LinkError::BufferTooSmall { len: self.len })?;
        let calculated = checksum(&self.buf[..body_end], direction.seed());
        if calculated != received {
            return Err(LinkError::Checksum {
                direction,
                calculated,
                received,
            });
        }
        Ok(direction)
    }

    /// Upper-case hex dump, for diagnostics
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.as_bytes())
    }

    /// Mutable view of `buf[start..start + count]`, extending the valid length
    /// to cover it.
    pub(crate) fn region_mut(&mut self, start: usize, count: usize) -> Result<&mut [u8], LinkError> {
        let end = start
            .checked_add(count)
            .filter(|&end| end <= FRAME_CAPACITY)
            .ok_or(LinkError::BufferTooSmall { len: count })?;
        self.len = end;
        Ok(&mut self.buf[start..end])
    }
}

impl PartialEq for RawFrame {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for RawFrame {}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawFrame({:02X?})", self.as_bytes())
    }
}
