//! # Meter Transport Module
//!
//! Serial communication with the Atorch meter's UART bridge.
//!
//! This module handles:
//! - Opening the serial port (8N1, 9600 baud by default)
//! - Device discovery by trying candidate paths in order
//! - Async read/write operations behind the [`MeterPort`] trait

pub mod port_trait;

pub use port_trait::MeterPort;

use async_trait::async_trait;
use std::io;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::error::{AtorchLoggerError, Result};

/// Default baud rate of Atorch UART bridges
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default meter device paths to try (in order of preference)
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyUSB0", // USB-to-serial adapters (most common for meter bridges)
    "/dev/ttyACM0", // USB CDC devices
];

/// Serial port handle for an Atorch meter
///
/// Exclusively owned by the active session once connected; never shared.
pub struct TokioMeterPort {
    /// Serial port handle
    port: tokio_serial::SerialStream,
    /// Device path (e.g., /dev/ttyUSB0)
    device_path: String,
}

impl std::fmt::Debug for TokioMeterPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioMeterPort")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl TokioMeterPort {
    /// Open a connection to the meter at the default paths and baud rate
    ///
    /// # Errors
    ///
    /// Returns [`AtorchLoggerError::PortNotFound`] if no candidate path opens.
    pub fn open() -> Result<Self> {
        Self::open_with_paths(DEFAULT_DEVICE_PATHS, DEFAULT_BAUD_RATE)
    }

    /// Open a connection to the meter, trying custom device paths in order
    ///
    /// This is the device-discovery step: the first path that opens wins,
    /// the rest are never touched.
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., `&["/dev/ttyUSB0"]`)
    /// * `baud_rate` - Serial baud rate
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Successfully opened meter device at {}", path);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(AtorchLoggerError::PortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port with meter settings (8N1)
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                AtorchLoggerError::Transport(format!("Failed to open {}: {}", path, e))
            })?;

        Ok(port)
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

#[async_trait]
impl MeterPort for TokioMeterPort {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use tokio::io::AsyncReadExt;
        self.port.read(buf).await
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.flush().await
    }
}
