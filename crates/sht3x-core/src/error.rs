//! Driver error type and the legacy numeric status codes

use embedded_hal::i2c::ErrorKind;
use thiserror_no_std::Error;

/// Operation completed successfully.
pub const STATUS_OK: i16 = 0;
/// The sensor answered with data that could not be used.
pub const STATUS_ERR_BAD_DATA: i16 = -1;
/// A received word failed its CRC-8 check.
pub const STATUS_CRC_FAIL: i16 = -2;
/// No SHT3x acknowledged at the requested address.
pub const STATUS_UNKNOWN_DEVICE: i16 = -3;
/// A caller-supplied parameter was out of range.
pub const STATUS_ERR_INVALID_PARAMS: i16 = -4;

/// Errors reported by the SHT3x driver.
///
/// Bus errors are reduced to their [`ErrorKind`] so the type stays `Copy`
/// and independent of the HAL in use.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sht3xError {
    #[error("I2C bus error: {0:?}")]
    Bus(ErrorKind),
    #[error("Sensor returned malformed data")]
    BadData,
    #[error("CRC mismatch: expected {expected:#04x}, received {actual:#04x}")]
    Crc { expected: u8, actual: u8 },
    #[error("No SHT3x device answered at address {0:#04x}")]
    UnknownDevice(u8),
    #[error("Invalid parameter: {0}")]
    InvalidParams(&'static str),
}

impl Sht3xError {
    /// Collapse any HAL bus error into a driver error.
    pub fn from_bus<E: embedded_hal::i2c::Error>(error: E) -> Self {
        Self::Bus(error.kind())
    }

    /// Numeric status code as used by the Sensirion C driver family.
    pub const fn status_code(&self) -> i16 {
        match self {
            Self::Bus(_) | Self::BadData => STATUS_ERR_BAD_DATA,
            Self::Crc { .. } => STATUS_CRC_FAIL,
            Self::UnknownDevice(_) => STATUS_UNKNOWN_DEVICE,
            Self::InvalidParams(_) => STATUS_ERR_INVALID_PARAMS,
        }
    }

    /// Whether the error came from the device not acknowledging.
    pub const fn is_nack(&self) -> bool {
        matches!(self, Self::Bus(ErrorKind::NoAcknowledge(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::NoAcknowledgeSource;

    #[test]
    fn test_status_codes() {
        assert_eq!(Sht3xError::BadData.status_code(), STATUS_ERR_BAD_DATA);
        assert_eq!(
            Sht3xError::Crc {
                expected: 0x92,
                actual: 0x00
            }
            .status_code(),
            STATUS_CRC_FAIL
        );
        assert_eq!(
            Sht3xError::UnknownDevice(0x44).status_code(),
            STATUS_UNKNOWN_DEVICE
        );
        assert_eq!(
            Sht3xError::InvalidParams("humidity").status_code(),
            STATUS_ERR_INVALID_PARAMS
        );
    }

    #[test]
    fn test_nack_detection() {
        let nack = Sht3xError::from_bus(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        assert!(nack.is_nack());
        assert!(!Sht3xError::from_bus(ErrorKind::Bus).is_nack());
    }
}
