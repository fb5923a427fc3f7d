//! Output formatters for device records.

pub mod console;
pub mod influxdb;

use crate::measurement::DeviceRecord;

/// Turns a [`DeviceRecord`] into one line of output.
pub trait OutputFormatter: Send + Sync {
    /// Line printed once before the first record, if the format has one.
    fn header(&self) -> Option<String> {
        None
    }

    fn format(&self, record: &DeviceRecord) -> String;
}

/// Output formats selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Format {
    /// Tab-separated table with a header row
    #[default]
    Console,
    /// InfluxDB line protocol, one point per record
    Influxdb,
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Format::Console => write!(f, "console"),
            Format::Influxdb => write!(f, "influxdb"),
        }
    }
}
