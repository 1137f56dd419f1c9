//! Alert threshold encoding
//!
//! The SHT3x stores each alert limit in a single word: the 7 most
//! significant bits of the humidity tick in bits 15..9 and the 9 most
//! significant bits of the temperature tick in bits 8..0.

use serde::{Deserialize, Serialize};

use crate::conversion::{
    HUMIDITY_MAX_MILLI_PERCENT, HUMIDITY_MIN_MILLI_PERCENT, TEMPERATURE_MAX_MILLI_C,
    TEMPERATURE_MIN_MILLI_C, humidity_to_tick, temperature_to_tick, tick_to_humidity,
    tick_to_temperature,
};
use crate::error::Sht3xError;
use crate::protocol::Command;

const HUMIDITY_MASK: u16 = 0xFE00;
const TEMPERATURE_MASK: u16 = 0x01FF;
const TEMPERATURE_SHIFT: u32 = 7;

/// The four alert limits of the SHT3x.
///
/// The alert pin asserts when a value rises above `HighSet` or falls below
/// `LowSet`, and releases once it is back between `LowClear` and `HighClear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertThreshold {
    HighSet,
    HighClear,
    LowClear,
    LowSet,
}

impl AlertThreshold {
    pub const ALL: [AlertThreshold; 4] = [
        AlertThreshold::HighSet,
        AlertThreshold::HighClear,
        AlertThreshold::LowClear,
        AlertThreshold::LowSet,
    ];

    pub const fn read_command(self) -> Command {
        match self {
            Self::HighSet => Command::ReadHighAlertSet,
            Self::HighClear => Command::ReadHighAlertClear,
            Self::LowClear => Command::ReadLowAlertClear,
            Self::LowSet => Command::ReadLowAlertSet,
        }
    }

    pub const fn write_command(self) -> Command {
        match self {
            Self::HighSet => Command::WriteHighAlertSet,
            Self::HighClear => Command::WriteHighAlertClear,
            Self::LowClear => Command::WriteLowAlertClear,
            Self::LowSet => Command::WriteLowAlertSet,
        }
    }

    /// Position in [`AlertThreshold::ALL`].
    pub const fn index(self) -> usize {
        match self {
            Self::HighSet => 0,
            Self::HighClear => 1,
            Self::LowClear => 2,
            Self::LowSet => 3,
        }
    }
}

/// A humidity/temperature pair for one alert threshold, in milli-units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertLimit {
    pub humidity_milli_percent: i32,
    pub temperature_milli_celsius: i32,
}

impl AlertLimit {
    /// Create a limit, rejecting values the sensor cannot represent.
    pub fn new(
        humidity_milli_percent: i32,
        temperature_milli_celsius: i32,
    ) -> Result<Self, Sht3xError> {
        if !(HUMIDITY_MIN_MILLI_PERCENT..=HUMIDITY_MAX_MILLI_PERCENT)
            .contains(&humidity_milli_percent)
        {
            return Err(Sht3xError::InvalidParams(
                "humidity limit must be within 0..=100000 milli-%RH",
            ));
        }
        if !(TEMPERATURE_MIN_MILLI_C..=TEMPERATURE_MAX_MILLI_C).contains(&temperature_milli_celsius)
        {
            return Err(Sht3xError::InvalidParams(
                "temperature limit must be within -45000..=130000 milli-°C",
            ));
        }

        Ok(Self {
            humidity_milli_percent,
            temperature_milli_celsius,
        })
    }

    /// Factory defaults from the datasheet.
    pub const fn datasheet_default(threshold: AlertThreshold) -> Self {
        let (humidity_milli_percent, temperature_milli_celsius) = match threshold {
            AlertThreshold::HighSet => (80_000, 60_000),
            AlertThreshold::HighClear => (79_000, 58_000),
            AlertThreshold::LowClear => (22_000, -9_000),
            AlertThreshold::LowSet => (20_000, -10_000),
        };
        Self {
            humidity_milli_percent,
            temperature_milli_celsius,
        }
    }

    /// Pack into the sensor's threshold word.
    pub const fn encode(&self) -> u16 {
        let humidity = humidity_to_tick(self.humidity_milli_percent);
        let temperature = temperature_to_tick(self.temperature_milli_celsius);
        (humidity & HUMIDITY_MASK) | ((temperature >> TEMPERATURE_SHIFT) & TEMPERATURE_MASK)
    }

    /// Unpack a threshold word. Precision is limited to the stored bits.
    pub const fn decode(word: u16) -> Self {
        let humidity = word & HUMIDITY_MASK;
        let temperature = (word & TEMPERATURE_MASK) << TEMPERATURE_SHIFT;
        Self {
            humidity_milli_percent: tick_to_humidity(humidity),
            temperature_milli_celsius: tick_to_temperature(temperature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_set_default_word() {
        let limit = AlertLimit::datasheet_default(AlertThreshold::HighSet);
        assert_eq!(limit.encode(), 0xCD33);
    }

    #[test]
    fn test_decode_is_within_one_step() {
        let limit = AlertLimit::decode(0xCD33);
        assert_eq!(limit.humidity_milli_percent, 79_687);
        assert_eq!(limit.temperature_milli_celsius, 59_931);

        for threshold in AlertThreshold::ALL {
            let original = AlertLimit::datasheet_default(threshold);
            let decoded = AlertLimit::decode(original.encode());
            assert!((original.humidity_milli_percent - decoded.humidity_milli_percent).abs() < 800);
            assert!(
                (original.temperature_milli_celsius - decoded.temperature_milli_celsius).abs()
                    < 350
            );
        }
    }

    #[test]
    fn test_out_of_range_limits_rejected() {
        assert!(matches!(
            AlertLimit::new(100_001, 25_000),
            Err(Sht3xError::InvalidParams(_))
        ));
        assert!(matches!(
            AlertLimit::new(-1, 25_000),
            Err(Sht3xError::InvalidParams(_))
        ));
        assert!(matches!(
            AlertLimit::new(50_000, -45_001),
            Err(Sht3xError::InvalidParams(_))
        ));
        assert!(matches!(
            AlertLimit::new(50_000, 130_001),
            Err(Sht3xError::InvalidParams(_))
        ));
        assert!(AlertLimit::new(100_000, 130_000).is_ok());
        assert!(AlertLimit::new(0, -45_000).is_ok());
    }

    #[test]
    fn test_threshold_commands() {
        assert_eq!(AlertThreshold::HighSet.read_command().code(), 0xE11F);
        assert_eq!(AlertThreshold::LowSet.write_command().code(), 0x6100);
        assert_eq!(AlertThreshold::LowClear.index(), 2);
    }
}
