//! Device settings decoded from query packets.
//!
//! Query packets are sent in reply to a `?` command (BLE) or read as a
//! feature report (HID). Only some fields are understood; the rest is kept
//! verbatim in `reserved`.

use std::time::Duration;
use time::Date;

/// Settings reported by a device, by transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Settings {
    Ble(BleSettings),
    Hid(HidSettings),
}

impl Settings {
    /// Calibration conversion factor in CPM per mR/h.
    pub fn conversion_factor(&self) -> u16 {
        match self {
            Settings::Ble(s) => s.conversion_factor,
            Settings::Hid(s) => s.conversion_factor,
        }
    }

    /// Alarm threshold, reported even when the alarm is disabled.
    pub fn alarm_level(&self) -> u16 {
        match self {
            Settings::Ble(s) => s.alarm_level,
            Settings::Hid(s) => s.alarm_level,
        }
    }
}

/// Query reply received over the BLE serial link.
#[derive(Debug, Clone, PartialEq)]
pub struct BleSettings {
    pub alarm_level: u16,
    pub conversion_factor: u16,
    pub reserved: Vec<u8>,
}

/// Flag byte of the HID feature report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HidFlags(pub u8);

impl HidFlags {
    fn bit(self, n: u8) -> bool {
        (self.0 >> n) & 1 == 1
    }

    /// Averaging time adapts to recent radiation levels.
    pub fn auto_averaging(self) -> bool {
        self.bit(0)
    }

    pub fn datalog_circular(self) -> bool {
        self.bit(1)
    }

    pub fn alarm_set(self) -> bool {
        self.bit(2)
    }

    /// Audible click per detection event.
    pub fn audible_clicks(self) -> bool {
        self.bit(3)
    }

    pub fn audible_beeps(self) -> bool {
        self.bit(4)
    }

    pub fn datalog_enabled(self) -> bool {
        self.bit(6)
    }
}

/// Feature report read over USB HID.
#[derive(Debug, Clone, PartialEq)]
pub struct HidSettings {
    /// Serial number as transmitted, leading NULs stripped
    pub serial: String,
    pub alarm_level: u16,
    /// `None` when the device still carries the 2000-01-01 default
    pub calibration_date: Option<Date>,
    /// Display contrast as a fraction of the maximum
    pub contrast: f64,
    /// Tube dead time
    pub dead_time: Duration,
    /// Length of a timed count
    pub count_duration: Duration,
    pub backlight_duration: Duration,
    pub conversion_factor: u16,
    pub datalog_interval: Duration,
    pub flags: HidFlags,
    pub reserved: Vec<u8>,
}

impl HidSettings {
    /// Numeric serial number, if the serial is all digits.
    pub fn serial_number(&self) -> Option<u64> {
        self.serial.parse().ok()
    }
}
