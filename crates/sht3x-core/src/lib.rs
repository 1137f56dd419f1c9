//! Hardware-independent core library for SHT3x humidity/temperature sensors
//!
//! This crate contains the platform-agnostic pieces of the SHT3x monitoring
//! stack: the Sensirion word protocol with CRC-8 validation, tick/milli-unit
//! conversion, status and alert threshold handling, the async `Sht3x` driver,
//! a shared (optionally multiplexed) I2C bus, and a monitor that discovers
//! and polls every sensor on that bus.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod alert;
pub mod async_i2c_bus;
pub mod config;
pub mod conversion;
pub mod crc;
pub mod driver;
#[cfg(any(test, feature = "emulator"))]
pub mod emulator;
pub mod error;
pub mod monitor;
pub mod protocol;
pub mod record;
pub mod sensors;
pub mod status;

pub use alert::{AlertLimit, AlertThreshold};
pub use driver::{I2cAddress, Measurement, MeasurementMode, Sht3x};
pub use error::Sht3xError;
pub use status::StatusWord;
