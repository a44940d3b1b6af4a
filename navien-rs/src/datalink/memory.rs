//! In-memory transport for tests and offline replay of captured traffic.

use std::collections::VecDeque;
use std::io;

use super::Transport;

/// Byte source and sink backed by memory.
///
/// Received bytes are pushed in whatever chunks the caller likes. Every
/// successful [`write`](Transport::write) is captured as one entry.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    rx: VecDeque<u8>,
    written: Vec<Vec<u8>>,
    write_limit: Option<usize>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes to the receive side.
    pub fn push(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    /// Bytes still waiting on the receive side.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Frames written so far, oldest first.
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    pub fn take_written(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.written)
    }

    /// Accept at most `limit` bytes per write, to model a short write.
    pub fn set_write_limit(&mut self, limit: Option<usize>) {
        self.write_limit = limit;
    }
}

impl Transport for MemoryTransport {
    fn available(&mut self) -> io::Result<usize> {
        Ok(self.rx.len())
    }

    fn peek(&mut self) -> io::Result<Option<u8>> {
        Ok(self.rx.front().copied())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if buf.len() > self.rx.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("requested {} bytes, {} buffered", buf.len(), self.rx.len()),
            ));
        }
        let n = buf.len();
        for (dst, src) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *dst = src;
        }
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let accepted = self.write_limit.map_or(bytes.len(), |limit| limit.min(bytes.len()));
        self.written.push(bytes[..accepted].to_vec());
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_in_chunks() {
        let mut t = MemoryTransport::new();
        t.push(&[1, 2]);
        t.push(&[3]);
        assert_eq!(t.available().unwrap(), 3);

        let mut buf = [0u8; 2];
        t.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2]);
        assert_eq!(t.peek().unwrap(), Some(3));
        t.discard().unwrap();
        assert_eq!(t.peek().unwrap(), None);
    }

    #[test]
    fn test_read_past_end_fails_without_consuming() {
        let mut t = MemoryTransport::new();
        t.push(&[1]);
        let mut buf = [0u8; 2];
        let err = t.read_exact(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(t.pending(), 1);
    }

    #[test]
    fn test_write_capture_and_limit() {
        let mut t = MemoryTransport::new();
        assert_eq!(t.write(&[0xF7, 0x05, 0x0F]).unwrap(), 3);
        t.set_write_limit(Some(1));
        assert_eq!(t.write(&[0xAA, 0xBB]).unwrap(), 1);
        assert_eq!(t.written(), &[vec![0xF7, 0x05, 0x0F], vec![0xAA]]);
        assert_eq!(t.take_written().len(), 2);
        assert!(t.written().is_empty());
    }
}
