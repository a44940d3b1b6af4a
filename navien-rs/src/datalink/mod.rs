//! Byte-stream transports underneath the link engine.
//!
//! The engine never touches a serial port directly. It needs four primitives
//! from whatever carries the bus bytes, captured by the [`Transport`] trait:
//!
//! - **available**: how many received bytes can be read without blocking
//! - **peek**: look at the next byte without consuming it
//! - **read_exact**: consume exactly `buf.len()` bytes that are known to be available
//! - **write**: put a frame on the wire
//!
//! Bytes may arrive in arbitrary chunks with arbitrary gaps; the engine copes
//! with that on its own, so implementations only need to preserve ordering.
//!
//! # Examples
//!
//! ```
//! use navien_rs::datalink::{MemoryTransport, Transport};
//!
//! let mut transport = MemoryTransport::new();
//! transport.push(&[0xF7, 0x05]);
//!
//! assert_eq!(transport.available().unwrap(), 2);
//! assert_eq!(transport.peek().unwrap(), Some(0xF7));
//!
//! let mut buf = [0u8; 2];
//! transport.read_exact(&mut buf).unwrap();
//! assert_eq!(buf, [0xF7, 0x05]);
//! ```

use std::io;

pub mod memory;

pub use memory::MemoryTransport;

/// Non-blocking access to the bus byte stream.
pub trait Transport {
    /// Number of received bytes ready to be read.
    fn available(&mut self) -> io::Result<usize>;

    /// Next received byte, left in place. `None` if nothing is buffered.
    fn peek(&mut self) -> io::Result<Option<u8>>;

    /// Consume exactly `buf.len()` bytes.
    ///
    /// Callers only ask for bytes that [`available`](Transport::available)
    /// reported; asking for more is an error.
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Write `bytes` to the bus, returning how many were accepted.
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Drop the next received byte.
    fn discard(&mut self) -> io::Result<()> {
        let mut byte = [0u8; 1];
        self.read_exact(&mut byte)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn available(&mut self) -> io::Result<usize> {
        (**self).available()
    }

    fn peek(&mut self) -> io::Result<Option<u8>> {
        (**self).peek()
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_exact(buf)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        (**self).write(bytes)
    }

    fn discard(&mut self) -> io::Result<()> {
        (**self).discard()
    }
}
