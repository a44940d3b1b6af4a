//! Outbound command frames.
//!
//! Every command starts from the same control header and a zeroed 12-byte
//! payload; builders set one field and seal the frame with the control-seed
//! checksum.

use crate::checksum::{checksum, CONTROL_SEED};
use crate::decode::{HOT_BUTTON_DOWN, POWER_OFF, POWER_ON, RECIRCULATION_OFF, RECIRCULATION_ON};
use crate::error::ControlError;
use crate::frame::{RawFrame, HEADER_SIZE};

/// Header plus cmd_type of every command frame.
pub const COMMAND_HEADER: [u8; 7] = [0xF7, 0x05, 0x0F, 0x50, 0x10, 0x0C, 0x4F];

/// Command payload length declared in [`COMMAND_HEADER`].
pub const COMMAND_PAYLOAD_LEN: usize = 0x0C;

/// Length of a sealed command frame on the wire.
pub const COMMAND_FRAME_LEN: usize = HEADER_SIZE + COMMAND_PAYLOAD_LEN + 1;

const OFF_POWER: usize = HEADER_SIZE + 2;
const OFF_SET_TEMP: usize = HEADER_SIZE + 3;
const OFF_BUTTONS: usize = HEADER_SIZE + 5;

/// Builds a single command frame.
#[derive(Debug, Clone, Copy)]
pub struct CommandBuilder {
    bytes: [u8; COMMAND_FRAME_LEN],
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBuilder {
    pub fn new() -> Self {
        let mut bytes = [0u8; COMMAND_FRAME_LEN];
        bytes[..COMMAND_HEADER.len()].copy_from_slice(&COMMAND_HEADER);
        Self { bytes }
    }

    pub fn power(mut self, on: bool) -> Self {
        self.bytes[OFF_POWER] = if on { POWER_ON } else { POWER_OFF };
        self
    }

    /// Set point in raw half-degree units.
    pub fn set_temp_raw(mut self, raw: u8) -> Self {
        self.bytes[OFF_SET_TEMP] = raw;
        self
    }

    /// Hot-button / recirculation bitmask. Zero releases any button.
    pub fn buttons(mut self, mask: u8) -> Self {
        self.bytes[OFF_BUTTONS] = mask;
        self
    }

    /// Compute the checksum and produce the wire frame.
    pub fn build(mut self) -> RawFrame {
        let body = COMMAND_FRAME_LEN - 1;
        self.bytes[body] = checksum(&self.bytes[..body], CONTROL_SEED);

        let mut frame = RawFrame::new();
        // A command frame always fits in a frame buffer
        if let Ok(dst) = frame.region_mut(0, COMMAND_FRAME_LEN) {
            dst.copy_from_slice(&self.bytes);
        }
        frame
    }
}

/// Convert °C to the raw half-degree encoding, rounding to the nearest step.
///
/// Zero means "unset" on the wire, so only 0.5..=127.5 °C can be sent.
pub fn encode_temperature(celsius: f32) -> Result<u8, ControlError> {
    let raw = (celsius * 2.0).round();
    if !(1.0..=255.0).contains(&raw) {
        return Err(ControlError::InvalidTemperature);
    }
    Ok(raw as u8)
}

pub fn power(on: bool) -> RawFrame {
    CommandBuilder::new().power(on).build()
}

pub fn set_temperature(raw: u8) -> RawFrame {
    CommandBuilder::new().set_temp_raw(raw).build()
}

pub fn hot_button_press() -> RawFrame {
    CommandBuilder::new().buttons(HOT_BUTTON_DOWN).build()
}

pub fn recirculation(on: bool) -> RawFrame {
    let mask = if on { RECIRCULATION_ON } else { RECIRCULATION_OFF };
    CommandBuilder::new().buttons(mask).build()
}

/// Clears the button byte, ending a momentary press.
pub fn button_release() -> RawFrame {
    CommandBuilder::new().buttons(0).build()
}
