//! # Atorch Logger Library
//!
//! Log Atorch DC power-meter telemetry over serial to SQLite with CSV export.
//!
//! This library provides the core functionality for decoding the Atorch binary
//! report protocol, managing the device session lifecycle, persisting every
//! decoded reading durably, and exporting the full history as CSV text.

pub mod atorch;
pub mod config;
pub mod error;
pub mod export;
pub mod session;
pub mod store;
pub mod transport;
