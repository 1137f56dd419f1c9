//! Published readings and their compact binary form

use alloc::vec::Vec;

use core::fmt::Write;

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::driver::{I2cAddress, Measurement};
use crate::status::StatusWord;

pub const MAX_NAME_LEN: usize = 16;

pub type SensorName = String<MAX_NAME_LEN>;

/// Where a sensor lives on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorId {
    pub channel: u8,
    pub address: I2cAddress,
}

impl SensorId {
    /// Human-readable name, e.g. `sensor_2_45`.
    pub fn name(&self) -> SensorName {
        let mut name = SensorName::new();
        // "sensor_255_45" is the longest possible name and fits
        let _ = write!(name, "sensor_{}_{:x}", self.channel, self.address.as_u8());
        name
    }
}

/// One reading from one sensor, as published by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingEvent {
    pub name: SensorName,
    pub id: SensorId,
    pub measurement: Measurement,
    pub status: StatusWord,
}

impl ReadingEvent {
    pub fn new(id: SensorId, measurement: Measurement, status: StatusWord) -> Self {
        Self {
            name: id.name(),
            id,
            measurement,
            status,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_names() {
        let id = SensorId {
            channel: 2,
            address: I2cAddress::Alternate,
        };
        assert_eq!(id.name().as_str(), "sensor_2_45");

        let id = SensorId {
            channel: 255,
            address: I2cAddress::Default,
        };
        assert_eq!(id.name().as_str(), "sensor_255_44");
    }

    #[test]
    fn test_event_encoding() {
        let event = ReadingEvent::new(
            SensorId {
                channel: 0,
                address: I2cAddress::Default,
            },
            Measurement {
                temperature_milli_celsius: -12_345,
                humidity_milli_percent: 67_890,
            },
            StatusWord(0x8400),
        );

        let bytes = event.to_bytes().unwrap();
        // Name, varint-packed fields and no padding
        assert!(bytes.len() < 32);
        assert_eq!(ReadingEvent::from_bytes(&bytes).unwrap(), event);
    }
}
