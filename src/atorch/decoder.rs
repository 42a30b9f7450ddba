//! # Atorch Frame Decoder
//!
//! Decodes Atorch DC report frames into typed measurement reports.
//!
//! [`decode_frame`] is a pure function over one complete frame window.
//! [`FrameAccumulator`] maintains the resynchronization cursor over an
//! arbitrary byte stream: it scans forward for the next magic sequence,
//! discards garbage after a failed decode, and yields complete reports in
//! stream order.

use bytes::{Buf, BytesMut};
use tracing::debug;

use super::checksum::frame_checksum;
use super::protocol::*;
use crate::error::{AtorchLoggerError, Result};

/// Decode a complete DC report frame
///
/// # Arguments
///
/// * `frame` - Complete frame bytes (magic, message type, device type,
///   measurement fields, checksum)
///
/// # Returns
///
/// * `Result<DcReport>` - Decoded report, or error if invalid
///
/// # Errors
///
/// Returns error if:
/// - Frame is shorter than 36 bytes
/// - Magic bytes are incorrect
/// - Message or device type is not a DC report
/// - Checksum verification fails
pub fn decode_frame(frame: &[u8]) -> Result<DcReport> {
    if frame.len() < DC_REPORT_FRAME_LENGTH {
        return Err(AtorchLoggerError::Protocol(format!(
            "Frame too short: expected {} bytes, got {}",
            DC_REPORT_FRAME_LENGTH,
            frame.len()
        )));
    }

    if frame[0] != ATORCH_MAGIC_0 || frame[1] != ATORCH_MAGIC_1 {
        return Err(AtorchLoggerError::Protocol(format!(
            "Invalid magic bytes: 0x{:02X} 0x{:02X}",
            frame[0], frame[1]
        )));
    }

    if frame[OFFSET_MSG_TYPE] != ATORCH_MSG_REPORT {
        return Err(AtorchLoggerError::Protocol(format!(
            "Unexpected message type: 0x{:02X}",
            frame[OFFSET_MSG_TYPE]
        )));
    }

    if frame[OFFSET_DEVICE_TYPE] != ATORCH_DEVICE_DC {
        return Err(AtorchLoggerError::Protocol(format!(
            "Unexpected device type: 0x{:02X}",
            frame[OFFSET_DEVICE_TYPE]
        )));
    }

    // Checksum covers everything between the magic bytes and the checksum byte
    let expected = frame_checksum(&frame[2..OFFSET_CHECKSUM]);
    let received = frame[OFFSET_CHECKSUM];
    if expected != received {
        return Err(AtorchLoggerError::Protocol(format!(
            "Checksum mismatch: expected 0x{:02X}, got 0x{:02X}",
            expected, received
        )));
    }

    // Voltage: 3 bytes, big-endian, in 0.1 V
    let voltage_mv = read_u24_be(frame, OFFSET_VOLTAGE) * 100;

    // Current: 3 bytes, big-endian, in mA
    let current_ma = read_u24_be(frame, OFFSET_CURRENT);

    // Capacity: 3 bytes, big-endian, in 0.01 Ah
    let capacity_centi_ah = read_u24_be(frame, OFFSET_CAPACITY);

    // Energy: 4 bytes, big-endian, in 0.01 kWh. The additive checksum is
    // weak enough that a corrupt frame can still verify, so an energy
    // value whose watt-hour conversion exceeds u32 is rejected rather
    // than wrapped into a garbage field.
    let energy_raw = read_u32_be(frame, OFFSET_ENERGY);
    let energy_wh = energy_raw.checked_mul(10).ok_or_else(|| {
        AtorchLoggerError::Protocol(format!("Energy field out of range: {}", energy_raw))
    })?;

    // Fee: 3 bytes, big-endian, in 0.01 currency
    let fee_centi = read_u24_be(frame, OFFSET_FEE);

    // Temperature: 2 bytes, big-endian, in degrees Celsius
    let temperature_c = read_u16_be(frame, OFFSET_TEMPERATURE) as i32;

    // Run time: hours (2 bytes) + minutes + seconds
    let hours = read_u16_be(frame, OFFSET_RUN_HOURS);
    let minutes = frame[OFFSET_RUN_MINUTES] as u32;
    let seconds = frame[OFFSET_RUN_SECONDS] as u32;
    let duration_s = hours * 3600 + minutes * 60 + seconds;

    let backlight = frame[OFFSET_BACKLIGHT];

    // The meter does not transmit power; derive it from voltage and current
    let power_w = (voltage_mv as u64 * current_ma as u64 / 1_000_000) as u32;

    Ok(DcReport {
        voltage_mv,
        current_ma,
        capacity_centi_ah,
        energy_wh,
        power_w,
        fee_centi,
        temperature_c,
        duration_s,
        backlight,
    })
}

fn read_u16_be(frame: &[u8], offset: usize) -> u32 {
    u32::from(frame[offset]) << 8 | u32::from(frame[offset + 1])
}

fn read_u24_be(frame: &[u8], offset: usize) -> u32 {
    u32::from(frame[offset]) << 16 | u32::from(frame[offset + 1]) << 8 | u32::from(frame[offset + 2])
}

fn read_u32_be(frame: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        frame[offset],
        frame[offset + 1],
        frame[offset + 2],
        frame[offset + 3],
    ])
}

/// Resynchronization buffer over the transport's byte stream
///
/// The transport delivers arbitrary chunks with no framing guarantee: a
/// chunk may contain a partial frame, several frames, or garbage from a
/// transport reset. The accumulator appends every chunk to an internal
/// buffer, locates frame boundaries by scanning for the magic sequence, and
/// discards bytes one at a time past a frame that fails to decode so a
/// corrupted frame never swallows a valid one behind it.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    buffer: BytesMut,
    frames_decoded: u64,
    decode_failures: u64,
    bytes_discarded: u64,
}

impl FrameAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk, returning all reports completed by it
    ///
    /// Decode failures are counted and logged at debug level; they never
    /// abort the stream.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DcReport> {
        self.buffer.extend_from_slice(chunk);
        let mut reports = Vec::new();

        loop {
            match find_magic(&self.buffer) {
                Some(start) => {
                    if start > 0 {
                        // Garbage before the frame boundary
                        self.bytes_discarded += start as u64;
                        self.buffer.advance(start);
                    }

                    if self.buffer.len() < DC_REPORT_FRAME_LENGTH {
                        // Partial frame; wait for more bytes
                        break;
                    }

                    match decode_frame(&self.buffer[..DC_REPORT_FRAME_LENGTH]) {
                        Ok(report) => {
                            self.frames_decoded += 1;
                            self.buffer.advance(DC_REPORT_FRAME_LENGTH);
                            reports.push(report);
                        }
                        Err(e) => {
                            // Skip one byte and rescan for the next boundary
                            debug!("Discarding malformed frame: {}", e);
                            self.decode_failures += 1;
                            self.bytes_discarded += 1;
                            self.buffer.advance(1);
                        }
                    }
                }
                None => {
                    // No frame boundary in sight. Keep a trailing 0xFF in case
                    // its 0x55 partner arrives in the next chunk.
                    let keep = usize::from(self.buffer.last() == Some(&ATORCH_MAGIC_0));
                    let drop = self.buffer.len() - keep;
                    if drop > 0 {
                        self.bytes_discarded += drop as u64;
                        self.buffer.advance(drop);
                    }
                    break;
                }
            }
        }

        reports
    }

    /// Total frames successfully decoded
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Total decode failures (expected transport noise)
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures
    }

    /// Total bytes discarded during resynchronization
    pub fn bytes_discarded(&self) -> u64 {
        self.bytes_discarded
    }
}

/// Find the first magic sequence in the buffer
fn find_magic(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(2)
        .position(|pair| pair == [ATORCH_MAGIC_0, ATORCH_MAGIC_1])
}
