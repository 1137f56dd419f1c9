//! Desktop simulator for the SHT3x monitoring stack.
//!
//! Runs the sht3x-core monitor against emulated sensors sitting behind an
//! emulated TCA9548A multiplexer, so discovery, polling, alerting and event
//! publishing can be exercised without hardware.
//!
//! # Environment
//!
//! | Variable                 | Default | Meaning                              |
//! |--------------------------|---------|--------------------------------------|
//! | `SHT3X_CHANNELS`         | 2       | Mux channels populated and scanned   |
//! | `SHT3X_MODE`             | high    | `low`, `medium` or `high`            |
//! | `SHT3X_POLL_INTERVAL_MS` | 1000    | Delay between polling rounds         |
//! | `SHT3X_POLL_COUNT`       | 10      | Number of polling rounds             |
//! | `SHT3X_ALERTS`           | 0       | `1` programs the default alert limits |
//!
//! A `.env` file in the working directory is loaded first.

use std::str::FromStr;

use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::pubsub::PubSubChannel;
use embassy_time::Timer;
use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};

use sht3x_core::async_i2c_bus::{
    MuxedBus, NoMux, SharedBus, SharedI2cDevice, SharedTca9548a, TCA9548A_CHANNELS,
};
use sht3x_core::config::{AlertConfig, MonitorConfig};
use sht3x_core::emulator::{EmulatedBus, EmulatedSht3x, TCA9548A_DEFAULT_ADDRESS};
use sht3x_core::monitor::{
    EVENT_CHANNEL_CAPACITY, EVENT_PUBLISHERS, EVENT_SUBSCRIBERS, SensorMonitor,
};
use sht3x_core::record::ReadingEvent;
use sht3x_core::MeasurementMode;
use tca9548a_embedded::r#async::Tca9548aAsync;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const DEFAULT_CHANNELS: u8 = 2;
const DEFAULT_POLL_INTERVAL_MS: u32 = 1_000;
const DEFAULT_POLL_COUNT: u32 = 10;

type ReadingChannel = PubSubChannel<
    CriticalSectionRawMutex,
    ReadingEvent,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

static READING_CHANNEL: ReadingChannel = PubSubChannel::new();

/// Timer-backed delay that every discovered sensor can hold a copy of.
#[derive(Debug, Clone, Copy, Default)]
struct TimerDelay;

impl DelayNs for TimerDelay {
    async fn delay_ns(&mut self, ns: u32) {
        Timer::after_nanos(ns as u64).await;
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

struct SimulatorSettings {
    monitor: MonitorConfig,
    poll_count: u32,
}

/// Parse a setting, falling back to `default` when it is missing or
/// malformed.
fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={:?}", key, raw);
            default
        }),
        None => default,
    }
}

fn parse_mode(raw: &str) -> Option<MeasurementMode> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "low" | "lpm" => Some(MeasurementMode::Low),
        "medium" | "mpm" => Some(MeasurementMode::Medium),
        "high" | "hpm" => Some(MeasurementMode::High),
        _ => None,
    }
}

/// Build the settings from `lookup`, which maps a variable name to its value.
fn settings_from(lookup: impl Fn(&str) -> Option<String>) -> SimulatorSettings {
    let mode = lookup("SHT3X_MODE")
        .and_then(|raw| {
            let mode = parse_mode(&raw);
            if mode.is_none() {
                warn!("Ignoring invalid SHT3X_MODE={:?}", raw);
            }
            mode
        })
        .unwrap_or_default();

    let alerts = parse_or("SHT3X_ALERTS", lookup("SHT3X_ALERTS"), 0u8) != 0;

    let monitor = MonitorConfig {
        channel_count: parse_or("SHT3X_CHANNELS", lookup("SHT3X_CHANNELS"), DEFAULT_CHANNELS)
            .clamp(1, TCA9548A_CHANNELS),
        mode,
        poll_interval_ms: parse_or(
            "SHT3X_POLL_INTERVAL_MS",
            lookup("SHT3X_POLL_INTERVAL_MS"),
            DEFAULT_POLL_INTERVAL_MS,
        ),
        alerts: alerts.then(AlertConfig::default),
        ..MonitorConfig::default()
    };

    SimulatorSettings {
        monitor,
        poll_count: parse_or("SHT3X_POLL_COUNT", lookup("SHT3X_POLL_COUNT"), DEFAULT_POLL_COUNT),
    }
}

fn load_settings() -> SimulatorSettings {
    match dotenvy::dotenv() {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Failed to load .env: {}", e),
    }

    settings_from(|key| std::env::var(key).ok())
}

// ---------------------------------------------------------------------------
// Emulated environment
// ---------------------------------------------------------------------------

/// Populate every scanned channel with a sensor on the default address, and
/// every other channel with a second sensor on the alternate address.
fn build_bus(channel_count: u8) -> EmulatedBus {
    let mut bus = EmulatedBus::with_mux(TCA9548A_DEFAULT_ADDRESS);

    for channel in 0..channel_count {
        let serial = 0x5348_0000 | (channel as u32) << 8;
        let mut devices = vec![EmulatedSht3x::new(0x44).on_channel(channel).with_serial(serial)];
        if channel % 2 == 0 {
            devices.push(
                EmulatedSht3x::new(0x45)
                    .on_channel(channel)
                    .with_serial(serial | 1),
            );
        }

        for device in devices {
            if bus.attach(device).is_err() {
                warn!("Emulated bus is full, skipping channel {}", channel);
            }
        }
    }

    bus
}

/// Move every emulated sensor along its own slow sinusoid.
fn drift_environment(bus: &mut EmulatedBus, t: f64) {
    for device in bus.devices_mut() {
        let phase = device.channel() as f64 * 0.7 + (device.address() - 0x44) as f64 * 1.9;

        // Temperature 18 to 30 °C, humidity 30 to 70 %RH
        let temperature = 24.0 + 6.0 * (t / 40.0 + phase).sin();
        let humidity = 50.0 + 20.0 * (t / 55.0 + phase).cos();

        device.set_environment((temperature * 1000.0) as i32, (humidity * 1000.0) as i32);
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();
    info!("Starting SHT3x simulator");

    let settings = load_settings();
    info!(
        "Channels: {}  Mode: {:?}  Interval: {} ms  Rounds: {}  Alerts: {}",
        settings.monitor.channel_count,
        settings.monitor.mode,
        settings.monitor.poll_interval_ms,
        settings.poll_count,
        settings.monitor.alerts.is_some()
    );

    block_on(run(settings));

    info!("Simulator exiting");
}

async fn run(settings: SimulatorSettings) {
    // The switch reaches the wires through a shared handle, leaving the raw
    // bus free for moving the emulated environment between rounds.
    let wires: SharedBus<EmulatedBus, NoMux> =
        Mutex::new(MuxedBus::unmuxed(build_bus(settings.monitor.channel_count)));
    let bus: SharedTca9548a<_> = Mutex::new(Tca9548aAsync::new(
        SharedI2cDevice::new(&wires, None),
        TCA9548A_DEFAULT_ADDRESS,
    ));

    let (publisher, mut subscriber) =
        match (READING_CHANNEL.publisher(), READING_CHANNEL.subscriber()) {
            (Ok(publisher), Ok(subscriber)) => (publisher, subscriber),
            _ => {
                error!("Failed to attach to the reading channel");
                return;
            }
        };

    let mut monitor = SensorMonitor::discover(&bus, TimerDelay, &settings.monitor, publisher).await;
    if monitor.is_empty() {
        error!("No sensors discovered");
        return;
    }
    for (id, name) in monitor.sensors() {
        info!("  {} (channel {}, address {:#04x})", name, id.channel, id.address.as_u8());
    }

    let mut elapsed_secs = 0.0;
    for round in 1..=settings.poll_count {
        drift_environment(wires.lock().await.i2c_mut(), elapsed_secs);

        let summary = monitor.poll().await;
        info!(
            "Round {}/{}: {} ok, {} failed",
            round, settings.poll_count, summary.succeeded, summary.failed
        );

        while let Some(event) = subscriber.try_next_message_pure() {
            info!(
                "{}: {:.3} °C, {:.3} %RH, status {:#06x}{}",
                event.name,
                event.measurement.temperature_celsius(),
                event.measurement.humidity_percent(),
                event.status.raw(),
                if event.status.is_alert_pending() { " ALERT" } else { "" },
            );

            match event.to_bytes() {
                Ok(bytes) => debug!("{}: {} bytes encoded", event.name, bytes.len()),
                Err(e) => warn!("{}: failed to encode reading: {}", event.name, e),
            }
        }

        Timer::after_millis(settings.monitor.poll_interval_ms as u64).await;
        elapsed_secs += settings.monitor.poll_interval_ms as f64 / 1000.0;
    }
}
