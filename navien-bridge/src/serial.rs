//! RS-485 serial transport
//!
//! Wraps a host serial port (USB RS-485 adapter or on-board UART) as a
//! [`Transport`]. The port is drained into a read-ahead buffer so the engine
//! can peek at the next byte.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use log::{info, trace};
use navien_rs::Transport;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

/// Read timeout; the port is only read when bytes are known to be waiting
const READ_TIMEOUT: Duration = Duration::from_millis(5);

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    rx_buffer: VecDeque<u8>,
}

impl SerialTransport {
    /// Open `path` at `baud_rate`, 8N1, no flow control.
    pub fn open(path: &str, baud_rate: u32) -> serialport::Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()?;
        info!("Opened {} at {} baud, 8N1", path, baud_rate);

        Ok(Self {
            port,
            rx_buffer: VecDeque::with_capacity(256),
        })
    }

    /// Move whatever the port has received into the read-ahead buffer.
    fn fill(&mut self) -> io::Result<()> {
        let waiting = self.port.bytes_to_read()? as usize;
        if waiting == 0 {
            return Ok(());
        }

        let mut buf = [0u8; 256];
        let want = waiting.min(buf.len());
        let n = match self.port.read(&mut buf[..want]) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => 0,
            Err(e) => return Err(e),
        };
        if n > 0 {
            trace!("UART_RX {} bytes: {:02X?}", n, &buf[..n.min(32)]);
            self.rx_buffer.extend(&buf[..n]);
        }
        Ok(())
    }
}

impl Transport for SerialTransport {
    fn available(&mut self) -> io::Result<usize> {
        self.fill()?;
        Ok(self.rx_buffer.len())
    }

    fn peek(&mut self) -> io::Result<Option<u8>> {
        if self.rx_buffer.is_empty() {
            self.fill()?;
        }
        Ok(self.rx_buffer.front().copied())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if self.rx_buffer.len() < buf.len() {
            self.fill()?;
        }
        if self.rx_buffer.len() < buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("need {} bytes, {} buffered", buf.len(), self.rx_buffer.len()),
            ));
        }
        let n = buf.len();
        for (dst, src) in buf.iter_mut().zip(self.rx_buffer.drain(..n)) {
            *dst = src;
        }
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        trace!("UART_TX {} bytes: {:02X?}", bytes.len(), bytes);
        Ok(bytes.len())
    }
}
