//! # Atorch Checksum Implementation
//!
//! Additive checksum used by the Atorch meter protocol.
//!
//! **Algorithm**: sum of all bytes after the two magic bytes, truncated to
//! 8 bits, XORed with 0x44.

/// XOR mask applied to the truncated byte sum
const CHECKSUM_MASK: u8 = 0x44;

/// Calculate the Atorch frame checksum
///
/// # Arguments
///
/// * `data` - Byte slice to checksum (everything between the magic bytes and
///   the checksum byte itself)
///
/// # Returns
///
/// * `u8` - Calculated checksum
///
/// # Examples
///
/// ```
/// use atorch_logger::atorch::checksum::frame_checksum;
///
/// let data = [0x11, 0x02, 0x01, 0x00, 0x00, 0x00, 0x00];
/// let checksum = frame_checksum(&data);
/// ```
pub fn frame_checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, &byte| acc.wrapping_add(byte));
    sum ^ CHECKSUM_MASK
}
