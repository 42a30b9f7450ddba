//! # Atorch Meter Protocol Module
//!
//! Implementation of the Atorch binary report protocol for DC power meters.
//!
//! This module handles:
//! - Report frame decoding (36-byte fixed-layout DC report)
//! - Outbound command frame encoding (reset counters, display control)
//! - Additive checksum calculation
//! - Frame synchronization and resynchronization after corrupted bytes

pub mod checksum;
pub mod decoder;
pub mod encoder;
pub mod protocol;
