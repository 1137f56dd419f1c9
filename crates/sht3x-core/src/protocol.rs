//! Sensirion command/response framing
//!
//! Every transfer to or from an SHT3x is built from 16-bit words sent MSB
//! first. Commands are a bare word; arguments and responses carry a CRC-8
//! byte after each word.

use crate::crc;
use crate::error::Sht3xError;

pub const COMMAND_SIZE: usize = 2;
pub const WORD_SIZE: usize = 2;
pub const CRC_SIZE: usize = 1;
/// Size of one word plus its checksum on the wire.
pub const WORD_WITH_CRC_SIZE: usize = WORD_SIZE + CRC_SIZE;
pub const MAX_BUFFER_WORDS: usize = 32;
pub const MAX_BUFFER_SIZE: usize = COMMAND_SIZE + MAX_BUFFER_WORDS * WORD_WITH_CRC_SIZE;

/// Worst-case single-shot measurement duration, for all repeatabilities.
pub const MEASUREMENT_DURATION_US: u32 = 15_000;
/// Time the sensor needs to come back after a soft reset.
pub const SOFT_RESET_DURATION_US: u32 = 2_000;

pub const GENERAL_CALL_ADDRESS: u8 = 0x00;
pub const GENERAL_CALL_RESET: u8 = 0x06;

/// Commands understood by the SHT3x family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Command {
    /// Single shot, high repeatability, no clock stretching
    MeasureHighRepeatability = 0x2400,
    /// Single shot, medium repeatability, no clock stretching
    MeasureMediumRepeatability = 0x240B,
    /// Single shot, low repeatability, no clock stretching
    MeasureLowRepeatability = 0x2416,
    ReadStatus = 0xF32D,
    ClearStatus = 0x3041,
    SoftReset = 0x30A2,
    HeaterEnable = 0x306D,
    HeaterDisable = 0x3066,
    ReadSerial = 0x3780,
    ReadHighAlertSet = 0xE11F,
    ReadHighAlertClear = 0xE114,
    ReadLowAlertClear = 0xE109,
    ReadLowAlertSet = 0xE102,
    WriteHighAlertSet = 0x611D,
    WriteHighAlertClear = 0x6116,
    WriteLowAlertClear = 0x610B,
    WriteLowAlertSet = 0x6100,
}

impl Command {
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Look up a command from its wire code.
    pub const fn from_code(code: u16) -> Option<Self> {
        let command = match code {
            0x2400 => Self::MeasureHighRepeatability,
            0x240B => Self::MeasureMediumRepeatability,
            0x2416 => Self::MeasureLowRepeatability,
            0xF32D => Self::ReadStatus,
            0x3041 => Self::ClearStatus,
            0x30A2 => Self::SoftReset,
            0x306D => Self::HeaterEnable,
            0x3066 => Self::HeaterDisable,
            0x3780 => Self::ReadSerial,
            0xE11F => Self::ReadHighAlertSet,
            0xE114 => Self::ReadHighAlertClear,
            0xE109 => Self::ReadLowAlertClear,
            0xE102 => Self::ReadLowAlertSet,
            0x611D => Self::WriteHighAlertSet,
            0x6116 => Self::WriteHighAlertClear,
            0x610B => Self::WriteLowAlertClear,
            0x6100 => Self::WriteLowAlertSet,
            _ => return None,
        };
        Some(command)
    }
}

/// Build the send buffer for `command` followed by `args`, each argument
/// interleaved with its checksum.
///
/// `buf` must hold at least `COMMAND_SIZE + args.len() * WORD_WITH_CRC_SIZE`
/// bytes. Returns the number of bytes written.
pub fn fill_command_buffer(buf: &mut [u8], command: u16, args: &[u16]) -> usize {
    buf[..COMMAND_SIZE].copy_from_slice(&command.to_be_bytes());
    let mut idx = COMMAND_SIZE;

    for arg in args {
        let bytes = arg.to_be_bytes();
        buf[idx..idx + WORD_SIZE].copy_from_slice(&bytes);
        buf[idx + WORD_SIZE] = crc::generate(&bytes);
        idx += WORD_WITH_CRC_SIZE;
    }

    idx
}

/// Number of bytes needed on the wire to carry `words` data words.
pub const fn wire_len(words: usize) -> usize {
    words * WORD_WITH_CRC_SIZE
}

/// Split a received byte stream into CRC-checked words.
pub fn decode_words(bytes: &[u8], words: &mut [u16]) -> Result<(), Sht3xError> {
    if bytes.len() != wire_len(words.len()) {
        return Err(Sht3xError::BadData);
    }

    for (chunk, word) in bytes.chunks_exact(WORD_WITH_CRC_SIZE).zip(words.iter_mut()) {
        crc::check(&chunk[..WORD_SIZE], chunk[WORD_SIZE])?;
        *word = bytes_to_u16(&chunk[..WORD_SIZE]);
    }

    Ok(())
}

/// Interpret two MSB-first bytes as a `u16`.
pub fn bytes_to_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

/// Interpret four MSB-first bytes as a `u32`.
pub fn bytes_to_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Interpret four MSB-first bytes as an IEEE-754 `f32`.
pub fn bytes_to_f32(bytes: &[u8]) -> f32 {
    f32::from_bits(bytes_to_u32(bytes))
}
