//! # Atorch Protocol Constants and Types
//!
//! Core protocol definitions for the Atorch DC meter binary protocol.
//!
//! All multi-byte fields are big-endian. A DC report frame is 36 bytes:
//!
//! ```text
//! Offset  Size  Field
//! 0       2     Magic (0xFF 0x55)
//! 2       1     Message type (0x01 = report)
//! 3       1     Device type (0x02 = DC meter)
//! 4       3     Voltage (0.1 V)
//! 7       3     Current (mA)
//! 10      3     Capacity (0.01 Ah)
//! 13      4     Energy (0.01 kWh)
//! 17      3     Accumulated fee (0.01 currency)
//! 20      4     Reserved
//! 24      2     Temperature (C)
//! 26      2     Run time, hours
//! 28      1     Run time, minutes
//! 29      1     Run time, seconds
//! 30      1     Backlight level
//! 31      4     Reserved
//! 35      1     Checksum
//! ```

/// First magic byte of every Atorch frame
pub const ATORCH_MAGIC_0: u8 = 0xFF;

/// Second magic byte of every Atorch frame
pub const ATORCH_MAGIC_1: u8 = 0x55;

/// Report message type (meter -> host)
pub const ATORCH_MSG_REPORT: u8 = 0x01;

/// Command message type (host -> meter)
pub const ATORCH_MSG_COMMAND: u8 = 0x11;

/// DC meter device type
pub const ATORCH_DEVICE_DC: u8 = 0x02;

/// Total length of a DC report frame, checksum included
pub const DC_REPORT_FRAME_LENGTH: usize = 36;

/// Total length of an outbound command frame, checksum included
pub const COMMAND_FRAME_LENGTH: usize = 10;

// DC report field offsets
pub const OFFSET_MSG_TYPE: usize = 2;
pub const OFFSET_DEVICE_TYPE: usize = 3;
pub const OFFSET_VOLTAGE: usize = 4;
pub const OFFSET_CURRENT: usize = 7;
pub const OFFSET_CAPACITY: usize = 10;
pub const OFFSET_ENERGY: usize = 13;
pub const OFFSET_FEE: usize = 17;
pub const OFFSET_TEMPERATURE: usize = 24;
pub const OFFSET_RUN_HOURS: usize = 26;
pub const OFFSET_RUN_MINUTES: usize = 28;
pub const OFFSET_RUN_SECONDS: usize = 29;
pub const OFFSET_BACKLIGHT: usize = 30;
pub const OFFSET_CHECKSUM: usize = 35;

/// Decoded DC meter report
///
/// One telemetry sample as transmitted by the meter, converted to integer
/// units. Carries no acquisition timestamp; the session stamps each report
/// at the moment of successful decode (see [`crate::store::Reading`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DcReport {
    /// Voltage in millivolts
    pub voltage_mv: u32,

    /// Current in milliamps
    pub current_ma: u32,

    /// Capacity in hundredths of an amp-hour (shown on the device display,
    /// not persisted)
    pub capacity_centi_ah: u32,

    /// Accumulated energy in watt-hours
    pub energy_wh: u32,

    /// Instantaneous power in watts, derived from voltage and current
    pub power_w: u32,

    /// Accumulated fee in hundredths of the device currency
    pub fee_centi: u32,

    /// Temperature in degrees Celsius
    pub temperature_c: i32,

    /// Elapsed session duration in seconds
    pub duration_s: u32,

    /// Backlight level (0-5)
    pub backlight: u8,
}

/// Outbound control commands understood by the DC meter
///
/// The wire value is the command id byte of the 10-byte command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Reset the accumulated energy counter
    ResetEnergy = 0x01,

    /// Reset the accumulated capacity counter
    ResetCapacity = 0x02,

    /// Reset the elapsed-duration counter
    ResetDuration = 0x03,

    /// Reset all accumulated counters
    ResetAll = 0x05,

    /// Enter the on-device setup menu
    Setup = 0x31,

    /// Confirm the current setup menu entry
    Enter = 0x32,

    /// Increment the selected setup value
    Plus = 0x33,

    /// Decrement the selected setup value
    Minus = 0x34,
}

impl Command {
    /// Look up a command by its CLI name
    ///
    /// # Examples
    ///
    /// ```
    /// use atorch_logger::atorch::protocol::Command;
    ///
    /// assert_eq!(Command::from_name("reset-all"), Some(Command::ResetAll));
    /// assert_eq!(Command::from_name("bogus"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "reset-energy" => Some(Self::ResetEnergy),
            "reset-capacity" => Some(Self::ResetCapacity),
            "reset-duration" => Some(Self::ResetDuration),
            "reset-all" => Some(Self::ResetAll),
            "setup" => Some(Self::Setup),
            "enter" => Some(Self::Enter),
            "plus" => Some(Self::Plus),
            "minus" => Some(Self::Minus),
            _ => None,
        }
    }
}
