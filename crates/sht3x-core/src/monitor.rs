//! Multi-sensor discovery and polling
//!
//! Scans every multiplexer channel for SHT3x sensors on both addresses,
//! keeps the ones that answer, and polls them as a group. Each successful
//! reading is published as a [`ReadingEvent`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! static READING_CHANNEL: PubSubChannel<...> = PubSubChannel::new();
//!
//! let publisher = READING_CHANNEL.publisher().unwrap();
//! let mut monitor = SensorMonitor::discover(&bus, Delay, &config, publisher).await;
//!
//! loop {
//!     monitor.poll().await;
//!     Timer::after_millis(config.poll_interval_ms as u64).await;
//! }
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pubsub::Publisher;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use heapless::Vec;
use log::{debug, error, info, warn};

use crate::alert::AlertThreshold;
use crate::async_i2c_bus::ChannelBus;
use crate::config::{AlertConfig, MonitorConfig};
use crate::driver::{I2cAddress, Measurement, Sht3x};
use crate::error::Sht3xError;
use crate::record::{ReadingEvent, SensorId, SensorName};
use crate::status::StatusWord;

/// Most sensors a monitor tracks: 8 mux channels × 2 addresses.
pub const MAX_SHT3X_SENSORS: usize = 16;

/// Channel capacity for reading events
/// Sized so one full poll round fits without a subscriber keeping up
pub const EVENT_CHANNEL_CAPACITY: usize = MAX_SHT3X_SENSORS;

/// Number of subscribers that can listen to reading events
pub const EVENT_SUBSCRIBERS: usize = 2;

/// Number of publishers (just the polling task)
pub const EVENT_PUBLISHERS: usize = 1;

pub type ReadingPublisher<'p> = Publisher<
    'p,
    CriticalSectionRawMutex,
    ReadingEvent,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

/// Outcome of one polling round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub succeeded: usize,
    pub failed: usize,
}

struct MonitoredSensor<'a, B: ChannelBus + 'a, D> {
    id: SensorId,
    name: SensorName,
    driver: Sht3x<B::Device<'a>, D>,
}

/// Every SHT3x found on a shared bus, polled together.
pub struct SensorMonitor<'a, 'p, B: ChannelBus + 'a, D> {
    sensors: Vec<MonitoredSensor<'a, B, D>, MAX_SHT3X_SENSORS>,
    publisher: ReadingPublisher<'p>,
}

impl<'a, 'p, B, D> SensorMonitor<'a, 'p, B, D>
where
    B: ChannelBus + 'a,
    D: DelayNs + Clone,
{
    /// Probe both addresses on every configured channel and keep the
    /// sensors that answer.
    ///
    /// The scan never goes past the channels the bus actually has, so a
    /// plain bus is scanned once whatever `channel_count` says.
    pub async fn discover(
        bus: &'a B,
        delay: D,
        config: &MonitorConfig,
        publisher: ReadingPublisher<'p>,
    ) -> Self {
        let mut sensors = Vec::new();
        let limit = config.sensor_limit();

        let channel_count = config.channel_count.min(B::CHANNELS);
        if channel_count < config.channel_count {
            warn!(
                "Bus has {} channel(s), ignoring the configured {}",
                B::CHANNELS,
                config.channel_count
            );
        }

        'scan: for channel in 0..channel_count {
            for address in I2cAddress::ALL {
                if sensors.len() >= limit {
                    warn!("Sensor limit of {} reached, stopping scan", limit);
                    break 'scan;
                }

                let id = SensorId { channel, address };
                let mut driver = Sht3x::new(bus.device(channel), delay.clone(), address);

                match driver.init().await {
                    Ok(()) => {}
                    Err(Sht3xError::UnknownDevice(_)) => {
                        debug!(
                            "No SHT3x at address {:#04x} on channel {}",
                            address.as_u8(),
                            channel
                        );
                        continue;
                    }
                    Err(e) => {
                        warn!(
                            "SHT3x at address {:#04x} on channel {} failed to initialize: {}",
                            address.as_u8(),
                            channel,
                            e
                        );
                        continue;
                    }
                }

                // Power-up leaves the alert and reset flags set
                if let Err(e) = driver.clear_status().await {
                    error!("Failed to clear the status of {}: {}", id.name(), e);
                }

                driver.set_power_mode(config.mode);
                if let Some(alerts) = &config.alerts {
                    program_alerts(&mut driver, &id, alerts).await;
                }

                let name = id.name();
                info!(
                    "Initialized SHT3x device with address {:#04x} at channel {} as {}",
                    address.as_u8(),
                    channel,
                    name
                );

                // Capacity is checked against the limit above
                let _ = sensors.push(MonitoredSensor { id, name, driver });
            }
        }

        info!("Discovered {} SHT3x sensor(s)", sensors.len());

        Self { sensors, publisher }
    }

    /// Measure every sensor once and publish the results.
    ///
    /// A failing sensor is logged and counted but does not stop the round.
    pub async fn poll(&mut self) -> PollSummary {
        let mut summary = PollSummary::default();

        for sensor in self.sensors.iter_mut() {
            match read_sensor(&mut sensor.driver).await {
                Ok((measurement, status)) => {
                    debug!(
                        "{}: {} m°C, {} m%RH, status {:#06x}",
                        sensor.name,
                        measurement.temperature_milli_celsius,
                        measurement.humidity_milli_percent,
                        status.raw()
                    );
                    if status.is_alert_pending() {
                        warn!("{}: alert pending (status {:#06x})", sensor.name, status.raw());
                    }

                    self.publisher
                        .publish_immediate(ReadingEvent::new(sensor.id, measurement, status));
                    summary.succeeded += 1;
                }
                Err(e) => {
                    warn!("{}: read failed: {} (code {})", sensor.name, e, e.status_code());
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// Ids and names of the discovered sensors, in scan order.
    pub fn sensors(&self) -> impl Iterator<Item = (SensorId, &str)> {
        self.sensors.iter().map(|s| (s.id, s.name.as_str()))
    }

    /// Latest measurement of every sensor that has produced one.
    pub fn latest(&self) -> impl Iterator<Item = (SensorId, Measurement)> {
        self.sensors
            .iter()
            .filter_map(|s| s.driver.last_measurement().map(|m| (s.id, m)))
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

async fn read_sensor<I, D>(driver: &mut Sht3x<I, D>) -> Result<(Measurement, StatusWord), Sht3xError>
where
    I: I2c,
    D: DelayNs,
{
    let measurement = driver.measure_blocking_read().await?;
    let status = driver.get_status().await?;
    Ok((measurement, status))
}

async fn program_alerts<I, D>(driver: &mut Sht3x<I, D>, id: &SensorId, alerts: &AlertConfig)
where
    I: I2c,
    D: DelayNs,
{
    for threshold in AlertThreshold::ALL {
        if let Err(e) = driver.set_alert_limit(threshold, alerts.limit(threshold)).await {
            error!(
                "Failed to program {:?} alert on {}: {}",
                threshold,
                id.name(),
                e
            );
        }
    }
}
