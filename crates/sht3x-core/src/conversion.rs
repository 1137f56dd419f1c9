//! Conversion between raw 16-bit sensor ticks and milli-units
//!
//! Temperature: `T[°C] = -45 + 175 * tick / 65535`
//! Humidity:    `RH[%] = 100 * tick / 65535`
//!
//! All arithmetic is fixed-point so it stays cheap on MCUs without an FPU.

/// Lowest temperature the sensor can represent, in milli-°C.
pub const TEMPERATURE_MIN_MILLI_C: i32 = -45_000;
/// Highest temperature accepted for alert limits, in milli-°C.
pub const TEMPERATURE_MAX_MILLI_C: i32 = 130_000;
pub const HUMIDITY_MIN_MILLI_PERCENT: i32 = 0;
pub const HUMIDITY_MAX_MILLI_PERCENT: i32 = 100_000;

/// Convert a temperature tick to milli-°C.
pub const fn tick_to_temperature(tick: u16) -> i32 {
    ((21875 * tick as i32) >> 13) - 45_000
}

/// Convert a humidity tick to milli-%RH.
pub const fn tick_to_humidity(tick: u16) -> i32 {
    (12500 * tick as i32) >> 13
}

/// Convert milli-°C to a temperature tick, saturating at the tick range.
pub const fn temperature_to_tick(temperature: i32) -> u16 {
    clamp_tick((temperature as i64 * 12271 + 552_195_000) >> 15)
}

/// Convert milli-%RH to a humidity tick, saturating at the tick range.
pub const fn humidity_to_tick(humidity: i32) -> u16 {
    clamp_tick((humidity as i64 * 21474) >> 15)
}

const fn clamp_tick(value: i64) -> u16 {
    if value < 0 {
        0
    } else if value > u16::MAX as i64 {
        u16::MAX
    } else {
        value as u16
    }
}
