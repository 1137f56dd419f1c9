//! Sensirion CRC-8 (polynomial 0x31, init 0xFF)

use crate::error::Sht3xError;

pub const CRC8_POLYNOMIAL: u8 = 0x31;
pub const CRC8_INIT: u8 = 0xFF;

/// Compute the CRC-8 checksum over `data`.
pub fn generate(data: &[u8]) -> u8 {
    let mut crc = CRC8_INIT;
    for byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC8_POLYNOMIAL
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Verify `data` against a received checksum.
pub fn check(data: &[u8], checksum: u8) -> Result<(), Sht3xError> {
    let expected = generate(data);
    if expected != checksum {
        return Err(Sht3xError::Crc {
            expected,
            actual: checksum,
        });
    }
    Ok(())
}
