use serde::{Deserialize, Serialize};

use crate::alert::{AlertLimit, AlertThreshold};
use crate::driver::MeasurementMode;
use crate::monitor::MAX_SHT3X_SENSORS;

/// Settings for a [`crate::monitor::SensorMonitor`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Number of multiplexer channels to scan (1 for a plain bus)
    pub channel_count: u8,
    pub mode: MeasurementMode,
    pub poll_interval_ms: u32,
    /// Upper bound on discovered sensors, capped at [`MAX_SHT3X_SENSORS`]
    pub max_sensors: u8,
    /// Alert limits to program into every sensor after discovery
    pub alerts: Option<AlertConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            channel_count: 1,
            mode: MeasurementMode::High,
            poll_interval_ms: 10_000,
            max_sensors: MAX_SHT3X_SENSORS as u8,
            alerts: None,
        }
    }
}

impl MonitorConfig {
    /// Decode a config blob previously written with [`MonitorConfig::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }

    pub fn to_bytes<'b>(&self, buf: &'b mut [u8]) -> Result<&'b mut [u8], postcard::Error> {
        postcard::to_slice(self, buf)
    }

    /// Effective sensor limit.
    pub fn sensor_limit(&self) -> usize {
        (self.max_sensors as usize).min(MAX_SHT3X_SENSORS)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertConfig {
    pub high_set: AlertLimit,
    pub high_clear: AlertLimit,
    pub low_clear: AlertLimit,
    pub low_set: AlertLimit,
}

impl AlertConfig {
    pub fn limit(&self, threshold: AlertThreshold) -> AlertLimit {
        match threshold {
            AlertThreshold::HighSet => self.high_set,
            AlertThreshold::HighClear => self.high_clear,
            AlertThreshold::LowClear => self.low_clear,
            AlertThreshold::LowSet => self.low_set,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            high_set: AlertLimit::datasheet_default(AlertThreshold::HighSet),
            high_clear: AlertLimit::datasheet_default(AlertThreshold::HighClear),
            low_clear: AlertLimit::datasheet_default(AlertThreshold::LowClear),
            low_set: AlertLimit::datasheet_default(AlertThreshold::LowSet),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_blob_round_trip() {
        let config = MonitorConfig {
            channel_count: 4,
            mode: MeasurementMode::Low,
            poll_interval_ms: 2_500,
            max_sensors: 6,
            alerts: Some(AlertConfig::default()),
        };

        let mut buf = [0u8; 128];
        let bytes = config.to_bytes(&mut buf).unwrap();
        assert_eq!(MonitorConfig::from_bytes(bytes).unwrap(), config);
    }

    #[test]
    fn test_sensor_limit_is_capped() {
        let config = MonitorConfig {
            max_sensors: 200,
            ..MonitorConfig::default()
        };
        assert_eq!(config.sensor_limit(), MAX_SHT3X_SENSORS);
    }

    #[test]
    fn test_truncated_blob_is_rejected() {
        let mut buf = [0u8; 128];
        let len = MonitorConfig::default().to_bytes(&mut buf).unwrap().len();
        assert!(MonitorConfig::from_bytes(&buf[..len - 1]).is_err());
    }
}
