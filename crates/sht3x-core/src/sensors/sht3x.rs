use crate::driver::{I2cAddress, MeasurementMode, Sht3x};
use crate::sensors::{SensorError, SensorReadings};

use super::Sensor;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::{error, info};

/// Typed readings from the SHT3x sensor.
/// This provides named access to sensor values and ensures type safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sht3xReadings {
    pub temperature_milli_celsius: i32,
    pub humidity_milli_percent: i32,
}

impl SensorReadings<2> for Sht3xReadings {
    fn to_array(self) -> [i32; 2] {
        [self.temperature_milli_celsius, self.humidity_milli_percent]
    }
}

pub struct Sht3xSensor<I, D> {
    sensor: Sht3x<I, D>,
    initialized: bool,
}

impl<I: I2c, D: DelayNs> Sht3xSensor<I, D> {
    pub fn new(i2c: I, delay: D, address: I2cAddress) -> Self {
        Self {
            sensor: Sht3x::new(i2c, delay, address),
            initialized: false,
        }
    }

    pub fn with_mode(mut self, mode: MeasurementMode) -> Self {
        self.sensor.set_power_mode(mode);
        self
    }

    /// Access the underlying driver for status, alert and heater control.
    pub fn driver(&mut self) -> &mut Sht3x<I, D> {
        &mut self.sensor
    }

    async fn initialize(&mut self) -> Result<(), SensorError> {
        self.sensor.init().await.map_err(|e| {
            error!("SHT3x init failed: {:?}", e);
            SensorError::InitializationFailed {
                sensor: "SHT3x",
                details: "Sensor did not answer the status register probe",
            }
        })?;

        // Start from a clean status word so later alert flags are meaningful
        self.sensor.clear_status().await.map_err(|e| {
            error!("SHT3x clear_status failed: {:?}", e);
            SensorError::InitializationFailed {
                sensor: "SHT3x",
                details: "Failed to clear the status register",
            }
        })?;

        info!("SHT3x: initialized in {:?} mode", self.sensor.mode());
        self.initialized = true;
        Ok(())
    }
}

// Implementation for actual I2c devices
impl<I: I2c, D: DelayNs> Sensor<2> for Sht3xSensor<I, D> {
    type Readings = Sht3xReadings;

    async fn read(&mut self) -> Result<Sht3xReadings, SensorError> {
        // Initialize sensor on first read
        if !self.initialized {
            self.initialize().await?;
        }

        let measurement = self.sensor.measure_blocking_read().await.map_err(|e| {
            error!("SHT3x measurement failed: {:?}", e);
            SensorError::ReadFailed {
                sensor: "SHT3x",
                operation: "measure temperature/humidity",
                details: "I2C communication error or invalid checksum",
            }
        })?;

        Ok(Sht3xReadings {
            temperature_milli_celsius: measurement.temperature_milli_celsius,
            humidity_milli_percent: measurement.humidity_milli_percent,
        })
    }
}
