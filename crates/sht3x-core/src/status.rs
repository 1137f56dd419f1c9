//! SHT3x status register

use serde::{Deserialize, Serialize};

pub const ALERT_PENDING: u16 = 0x8000;
pub const HEATER_ON: u16 = 0x2000;
pub const RH_TRACKING_ALERT: u16 = 0x0800;
pub const T_TRACKING_ALERT: u16 = 0x0400;
pub const SYSTEM_RESET_DETECTED: u16 = 0x0010;
pub const COMMAND_FAILED: u16 = 0x0002;
pub const WRITE_CRC_FAILED: u16 = 0x0001;

/// Flags removed by the clear status command.
pub const CLEARABLE: u16 = ALERT_PENDING | RH_TRACKING_ALERT | T_TRACKING_ALERT | SYSTEM_RESET_DETECTED;

/// Status word as read back from the sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusWord(pub u16);

impl StatusWord {
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// At least one alert is pending.
    pub const fn is_alert_pending(self) -> bool {
        self.0 & ALERT_PENDING != 0
    }

    pub const fn is_heater_on(self) -> bool {
        self.0 & HEATER_ON != 0
    }

    /// Humidity crossed one of its alert limits.
    pub const fn is_rh_tracking_alert(self) -> bool {
        self.0 & RH_TRACKING_ALERT != 0
    }

    /// Temperature crossed one of its alert limits.
    pub const fn is_t_tracking_alert(self) -> bool {
        self.0 & T_TRACKING_ALERT != 0
    }

    /// A reset (power-on, soft or general call) happened since the last clear.
    pub const fn is_system_reset_detected(self) -> bool {
        self.0 & SYSTEM_RESET_DETECTED != 0
    }

    /// The last command was not processed.
    pub const fn is_last_command_failed(self) -> bool {
        self.0 & COMMAND_FAILED != 0
    }

    /// The checksum of the last write transfer was wrong.
    pub const fn is_last_crc_failed(self) -> bool {
        self.0 & WRITE_CRC_FAILED != 0
    }
}

impl From<u16> for StatusWord {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_on_status() {
        let status = StatusWord(0x8010);
        assert!(status.is_alert_pending());
        assert!(status.is_system_reset_detected());
        assert!(!status.is_heater_on());
        assert!(!status.is_rh_tracking_alert());
        assert!(!status.is_t_tracking_alert());
        assert!(!status.is_last_crc_failed());
    }

    #[test]
    fn test_tracking_and_crc_bits() {
        let status = StatusWord(0x2C03);
        assert!(status.is_heater_on());
        assert!(status.is_rh_tracking_alert());
        assert!(status.is_t_tracking_alert());
        assert!(status.is_last_command_failed());
        assert!(status.is_last_crc_failed());
        assert!(!status.is_alert_pending());
    }

    #[test]
    fn test_clearable_mask_keeps_heater() {
        let status = StatusWord(0xAC13);
        assert_eq!(StatusWord(status.raw() & !CLEARABLE), StatusWord(0x2003));
    }
}
