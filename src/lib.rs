//! `radalert-listener` library.
//!
//! Reads telemetry from Radiation Alert geiger counters over Bluetooth LE or
//! USB HID, keeps rolling CPM statistics and reports them as console rows,
//! InfluxDB line protocol or uploads to public radiation maps.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup
//! and process exit codes. The run loop lives in [`crate::app`] where it can
//! be tested deterministically with an injected connector, publisher and
//! output streams.

pub mod address;
pub mod app;
pub mod codec;
pub mod measurement;
pub mod output;
pub mod session;
pub mod settings;
pub mod stats;
pub mod throttle;
pub mod transport;
pub mod upload;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use address::BluetoothAddress;
pub use codec::{CodecConfig, DecodeError, FrameCodec, Packet};
pub use measurement::{AlarmState, DeviceRecord, Measurement, Mode};
pub use output::OutputFormatter;
pub use output::console::ConsoleFormatter;
pub use output::influxdb::InfluxDbFormatter;
pub use session::{DeviceSession, SessionConfig};
pub use settings::Settings;
pub use stats::{RollingWindow, StatAggregator, WindowReport, WindowStats};
pub use throttle::{Throttle, parse_duration};
pub use transport::{Backend, Transport, TransportError};
