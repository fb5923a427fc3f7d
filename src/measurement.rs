//! Decoded Radiation Alert measurements and the record emitted per poll.

use crate::stats::{WindowReport, WindowStats};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

/// Display mode reported by the device.
///
/// The mode decides how the on-screen value is scaled. Mode numbers that are
/// not known yet are kept as [`Mode::Unknown`] rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Mode {
    /// Counts per minute
    Cpm,
    /// Counts per second, transmitted in tenths
    Cps,
    /// Microroentgen per hour
    MicroRoentgen,
    /// Microsievert per hour, transmitted as nSv/h
    MicroSievert,
    /// Timed total count
    Counts,
    /// Milliroentgen per hour, transmitted as µR/h
    MilliRoentgen,
    /// A mode number this crate does not recognise
    Unknown(u16),
}

impl Mode {
    /// Map a raw mode number from a status frame.
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0 => Mode::Cpm,
            1 => Mode::Cps,
            2 => Mode::MicroRoentgen,
            3 => Mode::MicroSievert,
            20 => Mode::Counts,
            23 => Mode::MilliRoentgen,
            other => Mode::Unknown(other),
        }
    }

    /// The raw mode number as it appears on the wire.
    pub fn raw(self) -> u16 {
        match self {
            Mode::Cpm => 0,
            Mode::Cps => 1,
            Mode::MicroRoentgen => 2,
            Mode::MicroSievert => 3,
            Mode::Counts => 20,
            Mode::MilliRoentgen => 23,
            Mode::Unknown(raw) => raw,
        }
    }

    /// Units of the on-screen value in this mode.
    pub fn units(self) -> &'static str {
        match self {
            Mode::Cpm => "cpm",
            Mode::Cps => "cps",
            Mode::MicroRoentgen => "µR/h",
            Mode::MicroSievert => "µSv/h",
            Mode::Counts => "counts",
            Mode::MilliRoentgen => "mR/h",
            Mode::Unknown(_) => "?",
        }
    }

    /// ASCII identifier, safe for use as a line-protocol tag value.
    pub fn slug(self) -> String {
        match self {
            Mode::Cpm => "cpm".into(),
            Mode::Cps => "cps".into(),
            Mode::MicroRoentgen => "ur_h".into(),
            Mode::MicroSievert => "usv_h".into(),
            Mode::Counts => "counts".into(),
            Mode::MilliRoentgen => "mr_h".into(),
            Mode::Unknown(raw) => format!("unknown_{raw}"),
        }
    }

    /// Scale a raw on-screen value into the units of this mode.
    pub fn scale(self, raw: u32) -> f64 {
        let raw = f64::from(raw);
        match self {
            Mode::Cps => raw / 10.0,
            Mode::MicroSievert | Mode::MilliRoentgen => raw / 1000.0,
            Mode::Cpm | Mode::MicroRoentgen | Mode::Counts | Mode::Unknown(_) => raw,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Unknown(raw) => write!(f, "mode {raw}"),
            known => f.write_str(known.units()),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    /// Accepts unit names (`cpm`, `mR/h`, `uSv/h`...) or a raw mode number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(raw) = s.parse::<u16>() {
            return Ok(Mode::from_raw(raw));
        }
        match s.to_lowercase().as_str() {
            "cpm" => Ok(Mode::Cpm),
            "cps" => Ok(Mode::Cps),
            "ur/h" | "µr/h" | "ur_h" => Ok(Mode::MicroRoentgen),
            "usv/h" | "µsv/h" | "usv_h" => Ok(Mode::MicroSievert),
            "counts" => Ok(Mode::Counts),
            "mr/h" | "mr_h" => Ok(Mode::MilliRoentgen),
            _ => Err(format!("unknown mode: {s}")),
        }
    }
}

/// Alarm state from a BLE status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmState {
    Disabled,
    Set,
    Alerting,
    Silenced,
}

impl AlarmState {
    /// Resolve the alarm flags. Silenced wins over alerting, alerting over set.
    pub fn from_flags(alerting: bool, set: bool, silenced: bool) -> Self {
        if silenced {
            AlarmState::Silenced
        } else if alerting {
            AlarmState::Alerting
        } else if set {
            AlarmState::Set
        } else {
            AlarmState::Disabled
        }
    }
}

/// A single decoded status frame.
///
/// `timestamp` and `rate_cpm` are `None` straight out of the codec; the
/// session fills them in with [`Measurement::observed`].
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Capture time, assigned by the session
    pub timestamp: Option<SystemTime>,
    /// 8-bit rolling packet id
    pub sequence: u8,
    /// Battery level in percent (0-100), `None` while charging or unreported
    pub battery_percent: Option<u8>,
    /// Device is on external power
    pub charging: bool,
    /// Alarm state, when the frame carries one
    pub alarm: Option<AlarmState>,
    /// Active display mode
    pub mode: Mode,
    /// On-screen value as transmitted
    pub raw_value: u32,
    /// On-screen value scaled into the units of `mode`
    pub display_value: f64,
    /// Counts observed during the current tick
    pub instantaneous_count: u32,
    /// Device-averaged counts per minute, when reported
    pub device_cpm: Option<u32>,
    /// Count rate derived from the tick interval
    pub rate_cpm: Option<f64>,
    /// Configured CPM per mR/h factor for `mode`
    pub conversion_factor: Option<f64>,
    /// Bytes at offsets whose meaning is not confirmed
    pub reserved: Vec<u8>,
}

impl Measurement {
    /// Attach the capture time and derived rate.
    pub fn observed(self, timestamp: SystemTime, rate_cpm: Option<f64>) -> Self {
        Self {
            timestamp: Some(timestamp),
            rate_cpm,
            ..self
        }
    }

    /// Dose rate in mR/h.
    ///
    /// Only available in [`Mode::MilliRoentgen`] with a configured conversion
    /// factor. Uses the derived rate, falling back to the device average.
    pub fn dose_rate_mr_h(&self) -> Option<f64> {
        if self.mode != Mode::MilliRoentgen {
            return None;
        }
        let factor = self.conversion_factor.filter(|f| *f > 0.0)?;
        let cpm = self.rate_cpm.or(self.device_cpm.map(f64::from))?;
        Some(cpm / factor)
    }
}

/// Consolidated record emitted by a session for each successful poll.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub timestamp: SystemTime,
    pub sequence: u8,
    pub battery_percent: Option<u8>,
    pub charging: bool,
    pub alarm: Option<AlarmState>,
    pub mode: Mode,
    pub display_value: f64,
    pub instantaneous_count: u32,
    pub rate_cpm: Option<f64>,
    pub device_cpm: Option<u32>,
    pub conversion_factor: Option<f64>,
    pub dose_rate_mr_h: Option<f64>,
    /// Conversion factor from the most recent query packet
    pub device_conversion_factor: Option<u16>,
    /// Statistics per configured window, shortest first
    pub windows: Vec<WindowReport>,
}

impl DeviceRecord {
    pub fn new(
        measurement: &Measurement,
        windows: Vec<WindowReport>,
        device_conversion_factor: Option<u16>,
    ) -> Self {
        Self {
            timestamp: measurement.timestamp.unwrap_or(SystemTime::UNIX_EPOCH),
            sequence: measurement.sequence,
            battery_percent: measurement.battery_percent,
            charging: measurement.charging,
            alarm: measurement.alarm,
            mode: measurement.mode,
            display_value: measurement.display_value,
            instantaneous_count: measurement.instantaneous_count,
            rate_cpm: measurement.rate_cpm,
            device_cpm: measurement.device_cpm,
            conversion_factor: measurement.conversion_factor,
            dose_rate_mr_h: measurement.dose_rate_mr_h(),
            device_conversion_factor,
            windows,
        }
    }

    /// Statistics for the window of exactly `duration`.
    pub fn window(&self, duration: Duration) -> Option<&WindowReport> {
        self.windows.iter().find(|w| w.duration == duration)
    }

    /// Statistics of the `index`-th window (shortest first), if it has data.
    pub fn window_stats(&self, index: usize) -> Option<WindowStats> {
        self.windows.get(index).and_then(|w| w.stats)
    }

    /// Configured factor, or the one the device last reported.
    pub fn effective_conversion_factor(&self) -> Option<f64> {
        self.conversion_factor
            .or(self.device_conversion_factor.map(f64::from))
            .filter(|f| *f > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::base_measurement;

    #[test]
    fn test_mode_round_trip_known_numbers() {
        for raw in [0, 1, 2, 3, 20, 23] {
            assert_eq!(Mode::from_raw(raw).raw(), raw);
        }
        assert_eq!(Mode::from_raw(7), Mode::Unknown(7));
        assert_eq!(Mode::Unknown(7).raw(), 7);
    }

    #[test]
    fn test_mode_scale() {
        assert_eq!(Mode::Cpm.scale(1070), 1070.0);
        assert_eq!(Mode::Cps.scale(178), 17.8);
        assert_eq!(Mode::MicroSievert.scale(1500), 1.5);
        assert_eq!(Mode::MilliRoentgen.scale(250), 0.25);
        assert_eq!(Mode::Unknown(99).scale(42), 42.0);
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("cpm".parse::<Mode>().unwrap(), Mode::Cpm);
        assert_eq!("mR/h".parse::<Mode>().unwrap(), Mode::MilliRoentgen);
        assert_eq!("µSv/h".parse::<Mode>().unwrap(), Mode::MicroSievert);
        assert_eq!("23".parse::<Mode>().unwrap(), Mode::MilliRoentgen);
        assert_eq!("42".parse::<Mode>().unwrap(), Mode::Unknown(42));
        assert!("furlongs".parse::<Mode>().is_err());
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(Mode::MilliRoentgen.to_string(), "mR/h");
        assert_eq!(Mode::Unknown(9).to_string(), "mode 9");
        assert_eq!(Mode::Unknown(9).slug(), "unknown_9");
    }

    #[test]
    fn test_alarm_state_precedence() {
        assert_eq!(AlarmState::from_flags(true, true, true), AlarmState::Silenced);
        assert_eq!(AlarmState::from_flags(true, true, false), AlarmState::Alerting);
        assert_eq!(AlarmState::from_flags(false, true, false), AlarmState::Set);
        assert_eq!(AlarmState::from_flags(false, false, false), AlarmState::Disabled);
    }

    #[test]
    fn test_dose_rate_only_in_milliroentgen_mode() {
        let mut m = base_measurement();
        m.rate_cpm = Some(2140.0);
        m.conversion_factor = Some(1070.0);

        m.mode = Mode::Cpm;
        assert_eq!(m.dose_rate_mr_h(), None);

        m.mode = Mode::MilliRoentgen;
        assert_eq!(m.dose_rate_mr_h(), Some(2.0));
    }

    #[test]
    fn test_dose_rate_falls_back_to_device_cpm() {
        let mut m = base_measurement();
        m.mode = Mode::MilliRoentgen;
        m.conversion_factor = Some(1000.0);
        m.device_cpm = Some(500);
        assert_eq!(m.dose_rate_mr_h(), Some(0.5));

        m.conversion_factor = Some(0.0);
        assert_eq!(m.dose_rate_mr_h(), None);
    }

    #[test]
    fn test_observed_sets_timestamp_and_rate() {
        let at = SystemTime::UNIX_EPOCH + Duration::from_secs(60);
        let m = base_measurement().observed(at, Some(12.0));
        assert_eq!(m.timestamp, Some(at));
        assert_eq!(m.rate_cpm, Some(12.0));
    }
}
