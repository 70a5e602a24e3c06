//! Byte transport underneath the telemetry protocols

use crate::error::Result;

mod serial;
pub use serial::SerialTransport;

#[cfg(test)]
pub(crate) mod mock;

/// Blocking byte stream with a per-read timeout
pub trait Transport: Send {
    /// Read up to `buffer.len()` bytes.
    ///
    /// Blocks until at least one byte arrives; fails with
    /// [`Error::Timeout`](crate::Error::Timeout) once the transport's read
    /// timeout elapses with nothing received.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write the whole buffer
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Flush pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Drop any inbound bytes already buffered
    fn clear_input(&mut self) -> Result<()>;

    /// Read exactly `buffer.len()` bytes or fail with a timeout
    fn read_exact(&mut self, buffer: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buffer.len() {
            filled += self.read(&mut buffer[filled..])?;
        }
        Ok(())
    }
}
