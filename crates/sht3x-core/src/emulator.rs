//! Register-level SHT3x emulator
//!
//! Models enough of the sensor (status register, alert limits, serial
//! number, heater, single-shot measurements) and of a TCA9548A channel
//! multiplexer to exercise the driver and the monitor without hardware.
//! Used by the unit tests and by the desktop simulator.

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};
use heapless::Vec;

use crate::alert::{AlertLimit, AlertThreshold};
use crate::conversion::{humidity_to_tick, temperature_to_tick};
use crate::crc;
use crate::protocol::{
    COMMAND_SIZE, Command, GENERAL_CALL_ADDRESS, GENERAL_CALL_RESET, WORD_SIZE,
    WORD_WITH_CRC_SIZE, bytes_to_u16,
};
use crate::status::{
    ALERT_PENDING, CLEARABLE, COMMAND_FAILED, HEATER_ON, RH_TRACKING_ALERT, StatusWord,
    SYSTEM_RESET_DETECTED, T_TRACKING_ALERT, WRITE_CRC_FAILED,
};

/// Status after power-up: alert pending and reset detected.
pub const POWER_ON_STATUS: u16 = ALERT_PENDING | SYSTEM_RESET_DETECTED;
pub const TCA9548A_DEFAULT_ADDRESS: u8 = 0x70;
pub const MAX_EMULATED_DEVICES: usize = 16;

/// Longest response the sensor produces (serial number or measurement).
const MAX_RESPONSE_SIZE: usize = 2 * WORD_WITH_CRC_SIZE;

/// Delay provider that returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDelay;

impl DelayNs for NoopDelay {
    async fn delay_ns(&mut self, _ns: u32) {}
}

/// One emulated SHT3x.
#[derive(Debug, Clone)]
pub struct EmulatedSht3x {
    address: u8,
    channel: u8,
    serial: u32,
    status: u16,
    thresholds: [u16; 4],
    temperature_milli_celsius: i32,
    humidity_milli_percent: i32,
    response: Option<Vec<u8, MAX_RESPONSE_SIZE>>,
    corrupt_next_crc: bool,
    last_command: Option<Command>,
}

impl EmulatedSht3x {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            channel: 0,
            serial: 0x0A1B_2C3D,
            status: POWER_ON_STATUS,
            thresholds: default_thresholds(),
            temperature_milli_celsius: 22_000,
            humidity_milli_percent: 45_000,
            response: None,
            corrupt_next_crc: false,
            last_command: None,
        }
    }

    /// Place the device behind a multiplexer channel.
    pub fn on_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_serial(mut self, serial: u32) -> Self {
        self.serial = serial;
        self
    }

    /// Set the conditions the next measurement will report.
    pub fn set_environment(&mut self, temperature_milli_celsius: i32, humidity_milli_percent: i32) {
        self.temperature_milli_celsius = temperature_milli_celsius;
        self.humidity_milli_percent = humidity_milli_percent;
    }

    /// Flip the last checksum byte of the next response.
    pub fn corrupt_next_crc(&mut self) {
        self.corrupt_next_crc = true;
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn status(&self) -> StatusWord {
        StatusWord(self.status)
    }

    pub fn threshold_word(&self, threshold: AlertThreshold) -> u16 {
        self.thresholds[threshold.index()]
    }

    pub fn last_command(&self) -> Option<Command> {
        self.last_command
    }

    fn reset(&mut self) {
        self.status = POWER_ON_STATUS;
        self.thresholds = default_thresholds();
        self.response = None;
    }

    fn handle_write(&mut self, bytes: &[u8]) -> Result<(), ErrorKind> {
        if bytes.len() < COMMAND_SIZE {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
        }

        let Some(command) = Command::from_code(bytes_to_u16(bytes)) else {
            self.status |= COMMAND_FAILED;
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
        };

        self.last_command = Some(command);
        self.response = None;
        self.status &= !COMMAND_FAILED;
        let args = &bytes[COMMAND_SIZE..];

        match command {
            Command::MeasureHighRepeatability
            | Command::MeasureMediumRepeatability
            | Command::MeasureLowRepeatability => self.measure(),
            Command::ReadStatus => self.respond(&[self.status]),
            Command::ClearStatus => self.status &= !CLEARABLE,
            Command::SoftReset => self.reset(),
            Command::HeaterEnable => self.status |= HEATER_ON,
            Command::HeaterDisable => self.status &= !HEATER_ON,
            Command::ReadSerial => {
                self.respond(&[(self.serial >> 16) as u16, self.serial as u16]);
            }
            Command::ReadHighAlertSet => self.respond_threshold(AlertThreshold::HighSet),
            Command::ReadHighAlertClear => self.respond_threshold(AlertThreshold::HighClear),
            Command::ReadLowAlertClear => self.respond_threshold(AlertThreshold::LowClear),
            Command::ReadLowAlertSet => self.respond_threshold(AlertThreshold::LowSet),
            Command::WriteHighAlertSet => self.write_threshold(AlertThreshold::HighSet, args),
            Command::WriteHighAlertClear => self.write_threshold(AlertThreshold::HighClear, args),
            Command::WriteLowAlertClear => self.write_threshold(AlertThreshold::LowClear, args),
            Command::WriteLowAlertSet => self.write_threshold(AlertThreshold::LowSet, args),
        }

        Ok(())
    }

    fn handle_read(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        // No data ready: the sensor does not acknowledge its read header.
        let Some(response) = self.response.take() else {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        };

        buf.fill(0xFF);
        let len = buf.len().min(response.len());
        buf[..len].copy_from_slice(&response[..len]);
        Ok(())
    }

    fn measure(&mut self) {
        let temperature = temperature_to_tick(self.temperature_milli_celsius);
        let humidity = humidity_to_tick(self.humidity_milli_percent);
        self.update_alerts();
        self.respond(&[temperature, humidity]);
    }

    fn update_alerts(&mut self) {
        let high_set = AlertLimit::decode(self.threshold_word(AlertThreshold::HighSet));
        let high_clear = AlertLimit::decode(self.threshold_word(AlertThreshold::HighClear));
        let low_clear = AlertLimit::decode(self.threshold_word(AlertThreshold::LowClear));
        let low_set = AlertLimit::decode(self.threshold_word(AlertThreshold::LowSet));

        let humidity = self.humidity_milli_percent;
        if humidity > high_set.humidity_milli_percent || humidity < low_set.humidity_milli_percent {
            self.status |= RH_TRACKING_ALERT | ALERT_PENDING;
        } else if humidity < high_clear.humidity_milli_percent
            && humidity > low_clear.humidity_milli_percent
        {
            self.status &= !RH_TRACKING_ALERT;
        }

        let temperature = self.temperature_milli_celsius;
        if temperature > high_set.temperature_milli_celsius
            || temperature < low_set.temperature_milli_celsius
        {
            self.status |= T_TRACKING_ALERT | ALERT_PENDING;
        } else if temperature < high_clear.temperature_milli_celsius
            && temperature > low_clear.temperature_milli_celsius
        {
            self.status &= !T_TRACKING_ALERT;
        }
    }

    fn respond_threshold(&mut self, threshold: AlertThreshold) {
        self.respond(&[self.threshold_word(threshold)]);
    }

    fn write_threshold(&mut self, threshold: AlertThreshold, args: &[u8]) {
        if args.len() != WORD_WITH_CRC_SIZE
            || crc::check(&args[..WORD_SIZE], args[WORD_SIZE]).is_err()
        {
            self.status |= WRITE_CRC_FAILED;
            return;
        }

        self.status &= !WRITE_CRC_FAILED;
        self.thresholds[threshold.index()] = bytes_to_u16(args);
    }

    fn respond(&mut self, words: &[u16]) {
        let mut response = Vec::new();
        for word in words {
            let bytes = word.to_be_bytes();
            // Capacity covers the longest response the model ever builds.
            let _ = response.extend_from_slice(&bytes);
            let _ = response.push(crc::generate(&bytes));
        }

        if self.corrupt_next_crc {
            self.corrupt_next_crc = false;
            if let Some(last) = response.last_mut() {
                *last ^= 0xFF;
            }
        }

        self.response = Some(response);
    }
}

fn default_thresholds() -> [u16; 4] {
    AlertThreshold::ALL.map(|threshold| AlertLimit::datasheet_default(threshold).encode())
}

/// An I2C bus populated with emulated sensors and an optional TCA9548A.
#[derive(Debug, Default)]
pub struct EmulatedBus {
    devices: Vec<EmulatedSht3x, MAX_EMULATED_DEVICES>,
    mux_address: Option<u8>,
    selected_channels: u8,
}

impl EmulatedBus {
    /// A bus without a multiplexer; every device is always reachable.
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus whose devices sit behind a TCA9548A at `address`.
    pub fn with_mux(address: u8) -> Self {
        Self {
            mux_address: Some(address),
            ..Self::default()
        }
    }

    /// Attach a device. Returns it back if the bus is full.
    pub fn attach(&mut self, device: EmulatedSht3x) -> Result<(), EmulatedSht3x> {
        self.devices.push(device)
    }

    pub fn device(&self, channel: u8, address: u8) -> Option<&EmulatedSht3x> {
        self.devices
            .iter()
            .find(|d| d.channel == channel && d.address == address)
    }

    pub fn device_mut(&mut self, channel: u8, address: u8) -> Option<&mut EmulatedSht3x> {
        self.devices
            .iter_mut()
            .find(|d| d.channel == channel && d.address == address)
    }

    pub fn devices_mut(&mut self) -> impl Iterator<Item = &mut EmulatedSht3x> {
        self.devices.iter_mut()
    }

    /// Channel bitmask last written to the multiplexer.
    pub fn selected_channels(&self) -> u8 {
        self.selected_channels
    }

    fn reachable(&mut self, address: u8) -> Result<&mut EmulatedSht3x, ErrorKind> {
        let mux_present = self.mux_address.is_some();
        let selected = self.selected_channels;
        self.devices
            .iter_mut()
            .find(|d| {
                d.address == address
                    && (!mux_present || selected & (1u8 << (d.channel & 0x07)) != 0)
            })
            .ok_or(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))
    }

    fn write_to(&mut self, address: u8, bytes: &[u8]) -> Result<(), ErrorKind> {
        if address == GENERAL_CALL_ADDRESS {
            if bytes == [GENERAL_CALL_RESET] {
                self.devices.iter_mut().for_each(EmulatedSht3x::reset);
            }
            return Ok(());
        }

        if self.mux_address == Some(address) {
            self.selected_channels = bytes.last().copied().unwrap_or(0);
            return Ok(());
        }

        self.reachable(address)?.handle_write(bytes)
    }

    fn read_from(&mut self, address: u8, buf: &mut [u8]) -> Result<(), ErrorKind> {
        if self.mux_address == Some(address) {
            buf.fill(self.selected_channels);
            return Ok(());
        }

        self.reachable(address)?.handle_read(buf)
    }
}

impl ErrorType for EmulatedBus {
    type Error = ErrorKind;
}

impl I2c for EmulatedBus {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for operation in operations {
            match operation {
                Operation::Write(bytes) => self.write_to(address, bytes)?,
                Operation::Read(buf) => self.read_from(address, buf)?,
            }
        }
        Ok(())
    }
}
