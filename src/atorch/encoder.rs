//! # Atorch Frame Encoder
//!
//! Encodes outbound command frames for the DC meter, plus report frames for
//! the test suite and device simulation.

use super::checksum::frame_checksum;
use super::protocol::*;

/// Encode a control command into a complete outbound frame
///
/// Frame layout: magic (2), message type 0x11, device type, command id,
/// four reserved zero bytes, checksum over everything after the magic.
///
/// # Arguments
///
/// * `command` - Control command to send
///
/// # Returns
///
/// * `Vec<u8>` - Complete 10-byte command frame
///
/// # Examples
///
/// ```
/// use atorch_logger::atorch::encoder::encode_command_frame;
/// use atorch_logger::atorch::protocol::Command;
///
/// let frame = encode_command_frame(Command::ResetAll);
/// assert_eq!(frame.len(), 10);
/// assert_eq!(frame[4], 0x05);
/// ```
pub fn encode_command_frame(command: Command) -> Vec<u8> {
    let mut frame = Vec::with_capacity(COMMAND_FRAME_LENGTH);
    frame.push(ATORCH_MAGIC_0);
    frame.push(ATORCH_MAGIC_1);
    frame.push(ATORCH_MSG_COMMAND);
    frame.push(ATORCH_DEVICE_DC);
    frame.push(command as u8);
    frame.extend_from_slice(&[0x00; 4]); // reserved

    let checksum = frame_checksum(&frame[2..]);
    frame.push(checksum);

    frame
}

/// Raw field values of a DC report frame
///
/// Field units match the wire encoding (voltage in 0.1 V, energy in
/// 0.01 kWh, and so on). Used to build byte-exact report frames in tests
/// and mock meters; the real meter is the only report producer at runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct DcReportFrame {
    /// Voltage in 0.1 V
    pub voltage_dv: u32,
    /// Current in mA
    pub current_ma: u32,
    /// Capacity in 0.01 Ah
    pub capacity_centi_ah: u32,
    /// Energy in 0.01 kWh
    pub energy_centi_kwh: u32,
    /// Fee in 0.01 currency
    pub fee_centi: u32,
    /// Temperature in degrees Celsius
    pub temperature_c: u16,
    /// Run time, hours component
    pub run_hours: u16,
    /// Run time, minutes component
    pub run_minutes: u8,
    /// Run time, seconds component
    pub run_seconds: u8,
    /// Backlight level
    pub backlight: u8,
}

impl DcReportFrame {
    /// Encode into a complete 36-byte report frame with a valid checksum
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = vec![0u8; DC_REPORT_FRAME_LENGTH];
        frame[0] = ATORCH_MAGIC_0;
        frame[1] = ATORCH_MAGIC_1;
        frame[OFFSET_MSG_TYPE] = ATORCH_MSG_REPORT;
        frame[OFFSET_DEVICE_TYPE] = ATORCH_DEVICE_DC;

        write_u24_be(&mut frame, OFFSET_VOLTAGE, self.voltage_dv);
        write_u24_be(&mut frame, OFFSET_CURRENT, self.current_ma);
        write_u24_be(&mut frame, OFFSET_CAPACITY, self.capacity_centi_ah);
        frame[OFFSET_ENERGY..OFFSET_ENERGY + 4]
            .copy_from_slice(&self.energy_centi_kwh.to_be_bytes());
        write_u24_be(&mut frame, OFFSET_FEE, self.fee_centi);
        frame[OFFSET_TEMPERATURE..OFFSET_TEMPERATURE + 2]
            .copy_from_slice(&self.temperature_c.to_be_bytes());
        frame[OFFSET_RUN_HOURS..OFFSET_RUN_HOURS + 2]
            .copy_from_slice(&self.run_hours.to_be_bytes());
        frame[OFFSET_RUN_MINUTES] = self.run_minutes;
        frame[OFFSET_RUN_SECONDS] = self.run_seconds;
        frame[OFFSET_BACKLIGHT] = self.backlight;

        frame[OFFSET_CHECKSUM] = frame_checksum(&frame[2..OFFSET_CHECKSUM]);
        frame
    }
}

fn write_u24_be(frame: &mut [u8], offset: usize, value: u32) {
    frame[offset] = (value >> 16) as u8;
    frame[offset + 1] = (value >> 8) as u8;
    frame[offset + 2] = value as u8;
}
