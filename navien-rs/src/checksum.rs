//! Rolling checksum used on the Navien RS-485 bus.
//!
//! Every frame ends with a single checksum byte computed over the header and
//! payload. The algorithm is a shift/XOR register with an 8-bit feedback seed;
//! the seed depends on which way the frame travels (see [`Direction`]).
//!
//! [`Direction`]: crate::frame::Direction

/// Seed for frames sent by the heater (status direction).
pub const STATUS_SEED: u8 = 0x4B;

/// Seed for frames sent to the heater (control direction).
pub const CONTROL_SEED: u8 = 0x62;

/// Calculate the bus checksum of `bytes` with the given feedback `seed`.
///
/// Inputs shorter than two bytes have a checksum of zero.
pub fn checksum(bytes: &[u8], seed: u8) -> u8 {
    if bytes.len() < 2 {
        return 0;
    }

    let mut result: u16 = 0xFF;
    for &byte in bytes {
        result <<= 1;
        if result > 0xFF {
            result = (result & 0xFF) ^ seed as u16;
        }
        // Only the low byte takes part in the XOR with the data
        result = (result & 0xFF) ^ byte as u16;
    }

    result as u8
}
