//! Async SHT3x driver
//!
//! Talks to one SHT3x over any `embedded_hal_async::i2c::I2c` implementation
//! using single-shot measurements without clock stretching. Each handle
//! carries its own measurement mode, so several sensors on one bus can run
//! at different repeatabilities.

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

use crate::alert::{AlertLimit, AlertThreshold};
use crate::conversion::{tick_to_humidity, tick_to_temperature};
use crate::error::Sht3xError;
use crate::protocol::{
    Command, GENERAL_CALL_ADDRESS, GENERAL_CALL_RESET, MAX_BUFFER_SIZE, MAX_BUFFER_WORDS,
    MEASUREMENT_DURATION_US, SOFT_RESET_DURATION_US, WORD_WITH_CRC_SIZE, decode_words,
    fill_command_buffer, wire_len,
};
use crate::status::StatusWord;

/// 7-bit I2C address, selected by the ADDR pin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum I2cAddress {
    /// ADDR pin low
    #[default]
    Default = 0x44,
    /// ADDR pin high
    Alternate = 0x45,
}

impl I2cAddress {
    pub const ALL: [I2cAddress; 2] = [I2cAddress::Default, I2cAddress::Alternate];

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<I2cAddress> for u8 {
    fn from(value: I2cAddress) -> Self {
        value.as_u8()
    }
}

impl TryFrom<u8> for I2cAddress {
    type Error = Sht3xError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x44 => Ok(Self::Default),
            0x45 => Ok(Self::Alternate),
            _ => Err(Sht3xError::InvalidParams(
                "SHT3x address must be 0x44 or 0x45",
            )),
        }
    }
}

/// Single-shot repeatability. Higher repeatability costs more power and time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasurementMode {
    /// Low power mode
    Low,
    /// Medium power mode
    Medium,
    /// High power mode
    #[default]
    High,
}

impl MeasurementMode {
    pub const fn command(self) -> Command {
        match self {
            Self::Low => Command::MeasureLowRepeatability,
            Self::Medium => Command::MeasureMediumRepeatability,
            Self::High => Command::MeasureHighRepeatability,
        }
    }
}

/// One temperature/humidity sample in milli-units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    pub temperature_milli_celsius: i32,
    pub humidity_milli_percent: i32,
}

impl Measurement {
    pub const fn from_ticks(temperature_tick: u16, humidity_tick: u16) -> Self {
        Self {
            temperature_milli_celsius: tick_to_temperature(temperature_tick),
            humidity_milli_percent: tick_to_humidity(humidity_tick),
        }
    }

    pub fn temperature_celsius(&self) -> f32 {
        self.temperature_milli_celsius as f32 / 1000.0
    }

    pub fn humidity_percent(&self) -> f32 {
        self.humidity_milli_percent as f32 / 1000.0
    }
}

/// Driver handle for a single SHT3x.
pub struct Sht3x<I, D> {
    i2c: I,
    delay: D,
    address: I2cAddress,
    mode: MeasurementMode,
    last_measurement: Option<Measurement>,
}

impl<I, D> Sht3x<I, D>
where
    I: I2c,
    D: DelayNs,
{
    /// Create a handle. No bus traffic happens until a command is issued.
    pub fn new(i2c: I, delay: D, address: I2cAddress) -> Self {
        Self {
            i2c,
            delay,
            address,
            mode: MeasurementMode::default(),
            last_measurement: None,
        }
    }

    /// Check that the sensor answers and log it.
    pub async fn init(&mut self) -> Result<(), Sht3xError> {
        self.probe().await?;
        info!(
            "SHT3x: sensor ready at address {:#04x}",
            self.address.as_u8()
        );
        Ok(())
    }

    /// Detect the sensor by reading its status register.
    pub async fn probe(&mut self) -> Result<(), Sht3xError> {
        match self.get_status().await {
            Ok(status) => {
                debug!(
                    "SHT3x@{:#04x}: probe ok, status {:#06x}",
                    self.address.as_u8(),
                    status.raw()
                );
                Ok(())
            }
            Err(e) if e.is_nack() => Err(Sht3xError::UnknownDevice(self.address.as_u8())),
            Err(e) => Err(e),
        }
    }

    pub async fn get_status(&mut self) -> Result<StatusWord, Sht3xError> {
        let mut words = [0u16; 1];
        self.read_command(Command::ReadStatus, &mut words).await?;
        Ok(StatusWord(words[0]))
    }

    /// Clear the alert and reset flags in the status register.
    pub async fn clear_status(&mut self) -> Result<(), Sht3xError> {
        self.write_command(Command::ClearStatus).await
    }

    /// Start a single-shot measurement in the current mode. Use [`Sht3x::read`]
    /// once it has finished.
    pub async fn measure(&mut self) -> Result<(), Sht3xError> {
        self.write_command(self.mode.command()).await
    }

    /// Fetch the result of a measurement started with [`Sht3x::measure`].
    ///
    /// The sensor does not acknowledge the read while the measurement is
    /// still running, which surfaces as a [`Sht3xError::Bus`] error.
    pub async fn read(&mut self) -> Result<Measurement, Sht3xError> {
        let mut words = [0u16; 2];
        self.read_words(&mut words).await?;

        let measurement = Measurement::from_ticks(words[0], words[1]);
        trace!(
            "SHT3x@{:#04x}: T={} m°C RH={} m%",
            self.address.as_u8(),
            measurement.temperature_milli_celsius,
            measurement.humidity_milli_percent
        );
        self.last_measurement = Some(measurement);
        Ok(measurement)
    }

    /// Start a measurement, wait for it to complete and read it out.
    pub async fn measure_blocking_read(&mut self) -> Result<Measurement, Sht3xError> {
        self.measure().await?;
        self.delay.delay_us(MEASUREMENT_DURATION_US).await;
        self.read().await
    }

    /// Switch between low power (`true`) and high repeatability (`false`).
    pub fn enable_low_power_mode(&mut self, enable: bool) {
        self.mode = if enable {
            MeasurementMode::Low
        } else {
            MeasurementMode::High
        };
    }

    pub fn set_power_mode(&mut self, mode: MeasurementMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> MeasurementMode {
        self.mode
    }

    pub async fn read_serial(&mut self) -> Result<u32, Sht3xError> {
        let mut words = [0u16; 2];
        self.read_command(Command::ReadSerial, &mut words).await?;
        Ok(((words[0] as u32) << 16) | words[1] as u32)
    }

    /// Program one alert threshold. Humidity is in milli-%RH, temperature in
    /// milli-°C.
    pub async fn set_alert_threshold(
        &mut self,
        threshold: AlertThreshold,
        humidity_milli_percent: i32,
        temperature_milli_celsius: i32,
    ) -> Result<(), Sht3xError> {
        let limit = AlertLimit::new(humidity_milli_percent, temperature_milli_celsius)?;
        self.set_alert_limit(threshold, limit).await
    }

    pub async fn set_alert_limit(
        &mut self,
        threshold: AlertThreshold,
        limit: AlertLimit,
    ) -> Result<(), Sht3xError> {
        debug!(
            "SHT3x@{:#04x}: {:?} <- {:?}",
            self.address.as_u8(),
            threshold,
            limit
        );
        self.write_command_with_args(threshold.write_command(), &[limit.encode()])
            .await
    }

    pub async fn get_alert_threshold(
        &mut self,
        threshold: AlertThreshold,
    ) -> Result<AlertLimit, Sht3xError> {
        let mut words = [0u16; 1];
        self.read_command(threshold.read_command(), &mut words)
            .await?;
        Ok(AlertLimit::decode(words[0]))
    }

    /// Reset this sensor without touching the rest of the bus.
    pub async fn soft_reset(&mut self) -> Result<(), Sht3xError> {
        self.write_command(Command::SoftReset).await?;
        self.delay.delay_us(SOFT_RESET_DURATION_US).await;
        Ok(())
    }

    pub async fn set_heater(&mut self, enable: bool) -> Result<(), Sht3xError> {
        let command = if enable {
            Command::HeaterEnable
        } else {
            Command::HeaterDisable
        };
        self.write_command(command).await
    }

    /// Send an I2C general call reset.
    ///
    /// Every device on the bus that supports general call will reset, not
    /// just this sensor.
    pub async fn general_call_reset(&mut self) -> Result<(), Sht3xError> {
        warn!("SHT3x: issuing general call reset, all devices on the bus will reset");
        self.i2c
            .write(GENERAL_CALL_ADDRESS, &[GENERAL_CALL_RESET])
            .await
            .map_err(Sht3xError::from_bus)?;
        self.delay.delay_us(SOFT_RESET_DURATION_US).await;
        Ok(())
    }

    pub fn address(&self) -> I2cAddress {
        self.address
    }

    /// The most recent successful measurement, if any.
    pub fn last_measurement(&self) -> Option<Measurement> {
        self.last_measurement
    }

    /// Give back the bus and the delay provider.
    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }

    async fn write_command(&mut self, command: Command) -> Result<(), Sht3xError> {
        self.write_command_with_args(command, &[]).await
    }

    async fn write_command_with_args(
        &mut self,
        command: Command,
        args: &[u16],
    ) -> Result<(), Sht3xError> {
        if args.len() > MAX_BUFFER_WORDS {
            return Err(Sht3xError::InvalidParams("too many argument words"));
        }

        let mut buf = [0u8; MAX_BUFFER_SIZE];
        let len = fill_command_buffer(&mut buf, command.code(), args);
        trace!("SHT3x@{:#04x}: {:?}", self.address.as_u8(), command);

        self.i2c
            .write(self.address.as_u8(), &buf[..len])
            .await
            .map_err(Sht3xError::from_bus)
    }

    async fn read_words(&mut self, words: &mut [u16]) -> Result<(), Sht3xError> {
        if words.len() > MAX_BUFFER_WORDS {
            return Err(Sht3xError::InvalidParams("too many words requested"));
        }

        let mut buf = [0u8; MAX_BUFFER_WORDS * WORD_WITH_CRC_SIZE];
        let len = wire_len(words.len());
        self.i2c
            .read(self.address.as_u8(), &mut buf[..len])
            .await
            .map_err(Sht3xError::from_bus)?;

        decode_words(&buf[..len], words)
    }

    async fn read_command(&mut self, command: Command, words: &mut [u16]) -> Result<(), Sht3xError> {
        self.write_command(command).await?;
        self.read_words(words).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::{EmulatedBus, EmulatedSht3x, NoopDelay};
    use crate::error::{STATUS_CRC_FAIL, STATUS_ERR_INVALID_PARAMS, STATUS_UNKNOWN_DEVICE};
    use embassy_futures::block_on;

    fn sensor_with(device: EmulatedSht3x) -> Sht3x<EmulatedBus, NoopDelay> {
        let address = I2cAddress::try_from(device.address()).unwrap();
        let mut bus = EmulatedBus::new();
        bus.attach(device).unwrap();
        Sht3x::new(bus, NoopDelay, address)
    }

    #[test]
    fn test_init_detects_sensor() {
        let mut sht = sensor_with(EmulatedSht3x::new(0x44));
        assert!(block_on(sht.init()).is_ok());
    }

    #[test]
    fn test_probe_missing_sensor_is_unknown_device() {
        let mut sht = Sht3x::new(EmulatedBus::new(), NoopDelay, I2cAddress::Alternate);
        let err = block_on(sht.probe()).unwrap_err();
        assert_eq!(err, Sht3xError::UnknownDevice(0x45));
        assert_eq!(err.status_code(), STATUS_UNKNOWN_DEVICE);
    }

    #[test]
    fn test_measure_blocking_read_matches_environment() {
        let mut device = EmulatedSht3x::new(0x44);
        device.set_environment(23_500, 41_200);
        let mut sht = sensor_with(device);

        let measurement = block_on(sht.measure_blocking_read()).unwrap();
        assert!((measurement.temperature_milli_celsius - 23_500).abs() <= 10);
        assert!((measurement.humidity_milli_percent - 41_200).abs() <= 10);
        assert_eq!(sht.last_measurement(), Some(measurement));
    }

    #[test]
    fn test_read_without_measure_fails() {
        let mut sht = sensor_with(EmulatedSht3x::new(0x44));
        let err = block_on(sht.read()).unwrap_err();
        assert!(err.is_nack());
        assert_eq!(sht.last_measurement(), None);
    }

    #[test]
    fn test_split_measure_and_read() {
        let mut device = EmulatedSht3x::new(0x44);
        device.set_environment(-5_000, 90_000);
        let mut sht = sensor_with(device);

        block_on(sht.measure()).unwrap();
        let measurement = block_on(sht.read()).unwrap();
        assert!((measurement.temperature_milli_celsius + 5_000).abs() <= 10);
        assert!((measurement.humidity_milli_percent - 90_000).abs() <= 10);
    }

    #[test]
    fn test_corrupted_crc_is_reported() {
        let mut device = EmulatedSht3x::new(0x44);
        device.corrupt_next_crc();
        let mut sht = sensor_with(device);

        let err = block_on(sht.measure_blocking_read()).unwrap_err();
        assert!(matches!(err, Sht3xError::Crc { .. }));
        assert_eq!(err.status_code(), STATUS_CRC_FAIL);
    }

    #[test]
    fn test_power_mode_selects_command() {
        let mut sht = sensor_with(EmulatedSht3x::new(0x44));
        assert_eq!(sht.mode(), MeasurementMode::High);

        sht.enable_low_power_mode(true);
        assert_eq!(sht.mode(), MeasurementMode::Low);
        block_on(sht.measure_blocking_read()).unwrap();

        sht.set_power_mode(MeasurementMode::Medium);
        block_on(sht.measure_blocking_read()).unwrap();

        sht.enable_low_power_mode(false);
        assert_eq!(sht.mode(), MeasurementMode::High);

        let (bus, _) = sht.release();
        let device = bus.device(0, 0x44).unwrap();
        assert_eq!(
            device.last_command(),
            Some(Command::MeasureMediumRepeatability)
        );
    }

    #[test]
    fn test_read_serial() {
        let mut sht = sensor_with(EmulatedSht3x::new(0x44).with_serial(0xDEAD_BEEF));
        assert_eq!(block_on(sht.read_serial()).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_alert_threshold_round_trip() {
        let mut sht = sensor_with(EmulatedSht3x::new(0x44));

        let default = block_on(sht.get_alert_threshold(AlertThreshold::HighSet)).unwrap();
        assert_eq!(default, AlertLimit::decode(0xCD33));

        block_on(sht.set_alert_threshold(AlertThreshold::LowSet, 30_000, 5_000)).unwrap();
        let limit = block_on(sht.get_alert_threshold(AlertThreshold::LowSet)).unwrap();
        assert!((limit.humidity_milli_percent - 30_000).abs() < 800);
        assert!((limit.temperature_milli_celsius - 5_000).abs() < 350);
    }

    #[test]
    fn test_invalid_alert_threshold_never_reaches_bus() {
        let mut sht = sensor_with(EmulatedSht3x::new(0x44));
        let err = block_on(sht.set_alert_threshold(AlertThreshold::HighSet, 120_000, 25_000))
            .unwrap_err();
        assert_eq!(err.status_code(), STATUS_ERR_INVALID_PARAMS);

        let (bus, _) = sht.release();
        assert_eq!(bus.device(0, 0x44).unwrap().last_command(), None);
    }

    #[test]
    fn test_clear_status_drops_reset_and_alert_flags() {
        let mut sht = sensor_with(EmulatedSht3x::new(0x44));

        let status = block_on(sht.get_status()).unwrap();
        assert!(status.is_system_reset_detected());
        assert!(status.is_alert_pending());

        block_on(sht.clear_status()).unwrap();
        let status = block_on(sht.get_status()).unwrap();
        assert!(!status.is_system_reset_detected());
        assert!(!status.is_alert_pending());
    }

    #[test]
    fn test_heater_and_soft_reset() {
        let mut sht = sensor_with(EmulatedSht3x::new(0x44));
        block_on(sht.clear_status()).unwrap();

        block_on(sht.set_heater(true)).unwrap();
        assert!(block_on(sht.get_status()).unwrap().is_heater_on());

        block_on(sht.soft_reset()).unwrap();
        let status = block_on(sht.get_status()).unwrap();
        assert!(!status.is_heater_on());
        assert!(status.is_system_reset_detected());
    }

    #[test]
    fn test_general_call_reset_restores_thresholds() {
        let mut sht = sensor_with(EmulatedSht3x::new(0x44));
        block_on(sht.set_alert_threshold(AlertThreshold::HighSet, 50_000, 30_000)).unwrap();

        block_on(sht.general_call_reset()).unwrap();
        let limit = block_on(sht.get_alert_threshold(AlertThreshold::HighSet)).unwrap();
        assert_eq!(limit, AlertLimit::decode(0xCD33));
    }

    #[test]
    fn test_address_conversion() {
        assert_eq!(I2cAddress::try_from(0x44), Ok(I2cAddress::Default));
        assert_eq!(I2cAddress::try_from(0x45), Ok(I2cAddress::Alternate));
        assert!(I2cAddress::try_from(0x46).is_err());
        assert_eq!(u8::from(I2cAddress::Alternate), 0x45);
    }
}
