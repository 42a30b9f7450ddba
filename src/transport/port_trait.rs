//! Trait abstraction for meter transport I/O to enable testing

use async_trait::async_trait;
use std::io;

/// Trait for the byte-oriented meter transport
///
/// Inbound and outbound are independent directions on the same connection:
/// the session multiplexes reads and writes over one exclusively-owned port.
#[async_trait]
pub trait MeterPort: Send {
    /// Read the next available chunk of bytes from the meter
    ///
    /// Returns the number of bytes read. `Ok(0)` means the transport closed
    /// (device powered off, cable pulled); the session treats it as a
    /// transport-initiated disconnect.
    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;
}
