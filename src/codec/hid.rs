//! Reports received over USB HID.
//!
//! Status report, little-endian: counts in the last second (`u32 @0`),
//! rolling packet id (`u8 @4`), on-screen value (`u32 @5`), mode number
//! (`u8 @9`) and five bytes of unknown purpose. HID devices are bus powered
//! and do not report battery, alarm state or a device average.

use super::{CodecConfig, DecodeError, u16_at, u32_at};
use crate::measurement::{Measurement, Mode};
use crate::settings::{HidFlags, HidSettings};
use std::time::Duration;
use time::macros::date;
use time::{Date, Month};

/// Highest plausible counts per second: 100x the 7500 cps rating of the
/// fastest sibling (1000EC). Anything above is line noise.
const MAX_CPS: u32 = 7500 * 100;

const UNCALIBRATED: Date = date!(2000 - 01 - 01);
const MAX_CONTRAST: u8 = 64;
const MAX_BACKLIGHT_SECS: u8 = 30;
const CONVERSION_RANGE: std::ops::RangeInclusive<u16> = 200..=7000;
const DATALOG_MINUTES_RANGE: std::ops::RangeInclusive<u16> = 1..=60;

fn out_of_range(field: &'static str, value: impl Into<i64>) -> DecodeError {
    DecodeError::FieldOutOfRange {
        field,
        value: value.into(),
    }
}

pub(super) fn decode_status(frame: &[u8], config: &CodecConfig) -> Result<Measurement, DecodeError> {
    let cps = u32_at(frame, 0);
    if cps > MAX_CPS {
        return Err(out_of_range("cps", cps));
    }

    let mode = Mode::from_raw(u16::from(frame[9]));
    let raw_value = u32_at(frame, 5);

    Ok(Measurement {
        timestamp: None,
        sequence: frame[4],
        battery_percent: None,
        charging: true,
        alarm: None,
        mode,
        raw_value,
        display_value: mode.scale(raw_value),
        instantaneous_count: cps,
        device_cpm: None,
        rate_cpm: None,
        conversion_factor: config.conversion_factor(mode),
        reserved: frame[10..15].to_vec(),
    })
}

/// 64-byte feature report.
///
/// | offset | size | field                                         |
/// |--------|------|-----------------------------------------------|
/// | 0      | 7    | serial number, ASCII, NUL padded              |
/// | 7      | 9    | unknown (an isotope name, then zeros)         |
/// | 16     | 1    | flags                                         |
/// | 17     | 2    | alarm level                                   |
/// | 19     | 2    | unknown                                       |
/// | 21     | 1    | calibration day                               |
/// | 22     | 2    | unknown                                       |
/// | 24     | 1    | calibration month                             |
/// | 25     | 1    | calibration year - 2000                       |
/// | 26     | 1    | unknown                                       |
/// | 27     | 1    | LCD contrast (of 64)                          |
/// | 28     | 2    | reciprocal tube dead time (1/s)               |
/// | 30     | 16   | unknown, eight words (isotope efficiencies?)  |
/// | 46     | 2    | timed count length (s)                        |
/// | 48     | 1    | backlight duration (s)                        |
/// | 49     | 2    | conversion factor (CPM per mR/h)              |
/// | 51     | 2    | datalog interval (min)                        |
/// | 53     | 11   | unknown                                       |
pub(super) fn decode_query(frame: &[u8]) -> Result<HidSettings, DecodeError> {
    let serial = frame[0..7]
        .iter()
        .skip_while(|b| **b == 0)
        .map(|b| char::from(*b))
        .collect::<String>();

    let calibration_date = calibration_date(frame[25], frame[24], frame[21])?;

    let contrast = frame[27];
    if contrast > MAX_CONTRAST {
        return Err(out_of_range("contrast", contrast));
    }

    let dead = u16_at(frame, 28);
    if dead == 0 {
        return Err(out_of_range("dead_time", dead));
    }

    let count_secs = u16_at(frame, 46);
    if count_secs == 0 {
        return Err(out_of_range("count_duration", count_secs));
    }

    let backlight_secs = frame[48];
    if backlight_secs > MAX_BACKLIGHT_SECS {
        return Err(out_of_range("backlight_duration", backlight_secs));
    }

    let conversion_factor = u16_at(frame, 49);
    if !CONVERSION_RANGE.contains(&conversion_factor) {
        return Err(out_of_range("conversion_factor", conversion_factor));
    }

    let datalog_minutes = u16_at(frame, 51);
    if !DATALOG_MINUTES_RANGE.contains(&datalog_minutes) {
        return Err(out_of_range("datalog_interval", datalog_minutes));
    }

    let mut reserved = Vec::with_capacity(36);
    for range in [7..16, 19..21, 22..24, 26..27, 30..46, 53..64] {
        reserved.extend_from_slice(&frame[range]);
    }

    Ok(HidSettings {
        serial,
        alarm_level: u16_at(frame, 17),
        calibration_date,
        contrast: f64::from(contrast) / f64::from(MAX_CONTRAST),
        dead_time: Duration::from_secs_f64(1.0 / f64::from(dead)),
        count_duration: Duration::from_secs(u64::from(count_secs)),
        backlight_duration: Duration::from_secs(u64::from(backlight_secs)),
        conversion_factor,
        datalog_interval: Duration::from_secs(u64::from(datalog_minutes) * 60),
        flags: HidFlags(frame[16]),
        reserved,
    })
}

/// Validate the calibration date. The factory default 2000-01-01 means
/// "never calibrated".
fn calibration_date(year: u8, month: u8, day: u8) -> Result<Option<Date>, DecodeError> {
    let month = Month::try_from(month).map_err(|_| out_of_range("calibration_month", month))?;
    let date = Date::from_calendar_date(2000 + i32::from(year), month, day)
        .map_err(|_| out_of_range("calibration_day", day))?;

    Ok((date != UNCALIBRATED).then_some(date))
}
