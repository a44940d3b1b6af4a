//! Error types for the Navien link engine.

use thiserror::Error;

use crate::frame::Direction;

/// Faults observed on the bus or in the transport.
///
/// Bus faults (everything except [`LinkError::Io`]) are reported through the
/// error listener and never stop the engine: the offending bytes are dropped
/// and framing restarts at the next marker.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Header declared the 0xFF length sentinel.
    #[error("invalid header length 0xFF, bus framing error, check wiring polarity")]
    InvalidLength,

    /// Header declared a payload that cannot fit in a frame buffer.
    #[error("buffer too small for declared payload length {len}, dropping packet")]
    BufferTooSmall { len: usize },

    /// Trailing checksum byte does not match the computed value.
    #[error("{direction:?} packet checksum error: 0x{calculated:02X} (calc) != 0x{received:02X} (recv)")]
    Checksum {
        direction: Direction,
        calculated: u8,
        received: u8,
    },

    /// Direction is known but the packet type or command type is not.
    #[error("unknown {direction:?} packet type 0x{packet_type:02X}: {}", hex::encode_upper(.raw))]
    UnknownPacket {
        direction: Direction,
        packet_type: u8,
        raw: Vec<u8>,
    },

    /// Direction byte is neither control nor status.
    #[error("unknown packet direction 0x{direction:02X}: {}", hex::encode_upper(.raw))]
    UnknownDirection { direction: u8, raw: Vec<u8> },

    /// Payload is too short to hold the fields of its packet type.
    #[error("{kind} payload too short: {len} bytes, need {needed}")]
    ShortPayload {
        kind: &'static str,
        len: usize,
        needed: usize,
    },

    /// A queued command was dropped because a gateway is now on the bus.
    #[error("command not sent, gateway present: {}", hex::encode_upper(.raw))]
    SendSuppressed { raw: Vec<u8> },

    /// Transport failure.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Synchronous failures of the control API.
///
/// These are expected conditions, not bus faults, and are never sent to the
/// error listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControlError {
    /// Send queue has no room for the frames this request needs.
    #[error("send queue full")]
    QueueFull,

    /// A gateway was seen on the bus; this engine no longer transmits.
    #[error("control unavailable, gateway present on the bus")]
    GatewayPresent,

    /// Requested set point cannot be encoded.
    #[error("temperature out of encodable range")]
    InvalidTemperature,
}

impl ControlError {
    /// Negative status code for hosts that expect an integer result.
    pub fn code(&self) -> i32 {
        match self {
            ControlError::QueueFull => -1,
            ControlError::GatewayPresent => -2,
            ControlError::InvalidTemperature => -3,
        }
    }
}

/// Result type for link operations
pub type Result<T> = std::result::Result<T, LinkError>;
