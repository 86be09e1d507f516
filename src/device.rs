/* Abstraction over the byte devices the modem client talks through. */

use crate::ModemResult;
use bytes::{Bytes, BytesMut};
use serial2::SerialPort;
use std::io::ErrorKind;
use std::time::Duration;

const READ_CHUNK_SIZE: usize = 64;
const SERIAL_POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Capability interface over a bidirectional byte stream.
///
/// The modem client only ever does non-blocking reads: it consumes exactly
/// the bytes currently available and leaves blocking/timeouts to the caller.
pub trait IoDevice {
    /// Number of bytes immediately readable without blocking.
    fn bytes_waiting(&mut self) -> ModemResult<usize>;
    /// Read up to `buf.len()` bytes without blocking. May return fewer, or 0.
    fn read_available(&mut self, buf: &mut [u8]) -> ModemResult<usize>;
    /// Write all bytes, in order.
    fn write_all(&mut self, data: &[u8]) -> ModemResult<()>;
    /// Identifier for diagnostics only.
    fn port_name(&self) -> String;
}

/// Serial port backend.
///
/// `serial2` has no input-queue query, so reads are staged through an internal
/// buffer with a short poll timeout to satisfy [`IoDevice::bytes_waiting`].
#[derive(Debug)]
pub struct SerialDevice {
    port: SerialPort,
    name: String,
    staged: BytesMut,
}

impl SerialDevice {
    /// Opens `path` in 8N1 mode at the given baud rate.
    pub fn open(path: &str, baud_rate: u32) -> ModemResult<Self> {
        let mut port = SerialPort::open(path, baud_rate)?;
        port.set_read_timeout(SERIAL_POLL_TIMEOUT)?;
        Ok(Self {
            port,
            name: path.to_string(),
            staged: BytesMut::with_capacity(READ_CHUNK_SIZE * 4),
        })
    }

    /// Drains whatever the OS has buffered into the staging buffer.
    fn pull(&mut self) -> ModemResult<()> {
        let mut chunk_buf = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.port.read(&mut chunk_buf) {
                Ok(0) => break,
                Ok(n_read) => {
                    self.staged.extend_from_slice(&chunk_buf[..n_read]);
                    if n_read < READ_CHUNK_SIZE {
                        break;
                    }
                }
                // Nothing waiting right now
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl IoDevice for SerialDevice {
    fn bytes_waiting(&mut self) -> ModemResult<usize> {
        if self.staged.is_empty() {
            self.pull()?;
        }
        Ok(self.staged.len())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> ModemResult<usize> {
        if self.staged.is_empty() {
            self.pull()?;
        }
        let n = buf.len().min(self.staged.len());
        buf[..n].copy_from_slice(&self.staged.split_to(n));
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> ModemResult<()> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn port_name(&self) -> String {
        self.name.clone()
    }
}

/// In-memory byte device for tests and examples.
///
/// Bytes written by the client are captured in an output buffer; bytes for the
/// client to read are supplied up front or via [`MockIoDev::feed`].
#[derive(Debug, Default)]
pub struct MockIoDev {
    in_buf: BytesMut,
    out_buf: BytesMut,
}

impl MockIoDev {
    pub fn new(in_buf: &[u8]) -> Self {
        Self {
            in_buf: BytesMut::from(in_buf),
            out_buf: BytesMut::new(),
        }
    }

    /// Appends bytes for the client to read.
    pub fn feed(&mut self, data: &[u8]) {
        self.in_buf.extend_from_slice(data);
    }

    /// Everything the client has written so far.
    pub fn written(&self) -> &[u8] {
        &self.out_buf
    }

    /// Takes the captured output, leaving the buffer empty.
    pub fn take_written(&mut self) -> Bytes {
        self.out_buf.split().freeze()
    }
}

impl IoDevice for MockIoDev {
    fn bytes_waiting(&mut self) -> ModemResult<usize> {
        Ok(self.in_buf.len())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> ModemResult<usize> {
        let n = buf.len().min(self.in_buf.len());
        buf[..n].copy_from_slice(&self.in_buf.split_to(n));
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> ModemResult<()> {
        self.out_buf.extend_from_slice(data);
        Ok(())
    }

    fn port_name(&self) -> String {
        "MockPort".to_string()
    }
}
