//! Frames received over the BLE "Transparent UART" link.
//!
//! Status frame, little-endian:
//!
//! | offset | size | field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 4    | counts in the last second               |
//! | 4      | 4    | on-screen value (scaled by mode)        |
//! | 8      | 2    | mode number                             |
//! | 10     | 4    | device-averaged counts per minute       |
//! | 14     | 1    | status bits                             |
//! | 15     | 1    | rolling packet id                       |
//!
//! Status bits: 0-2 power level (quarters, 5 = charging), 3 alarm alerting,
//! 4 alarm set, 5 alarm silenced, 6-7 unknown.

use super::{CodecConfig, u16_at, u32_at};
use crate::measurement::{AlarmState, Measurement, Mode};
use crate::settings::BleSettings;

const POWER_MASK: u8 = 0x07;
const POWER_CHARGING: u8 = 5;
const PERCENT_PER_POWER_LEVEL: u8 = 25;

pub(super) fn decode_status(frame: &[u8], config: &CodecConfig) -> Measurement {
    let status = frame[14];
    let power = status & POWER_MASK;
    let charging = power == POWER_CHARGING;
    let battery_percent =
        (!charging).then(|| power.saturating_mul(PERCENT_PER_POWER_LEVEL).min(100));

    let alarm = AlarmState::from_flags(
        (status >> 3) & 1 == 1,
        (status >> 4) & 1 == 1,
        (status >> 5) & 1 == 1,
    );

    let mode = Mode::from_raw(u16_at(frame, 8));
    let raw_value = u32_at(frame, 4);

    Measurement {
        timestamp: None,
        sequence: frame[15],
        battery_percent,
        charging,
        alarm: Some(alarm),
        mode,
        raw_value,
        display_value: mode.scale(raw_value),
        instantaneous_count: u32_at(frame, 0),
        device_cpm: Some(u32_at(frame, 10)),
        rate_cpm: None,
        conversion_factor: config.conversion_factor(mode),
        reserved: vec![status >> 6],
    }
}

/// Query reply: marker, alarm level, two unknown words, conversion factor,
/// unknown trailer.
pub(super) fn decode_query(frame: &[u8]) -> BleSettings {
    let mut reserved = Vec::with_capacity(8);
    reserved.extend_from_slice(&frame[6..10]);
    reserved.extend_from_slice(&frame[12..16]);

    BleSettings {
        alarm_level: u16_at(frame, 4),
        conversion_factor: u16_at(frame, 10),
        reserved,
    }
}
