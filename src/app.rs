//! Core application runner for `radalert-listener`.
//!
//! Kept apart from process setup so the run loop can be driven by a fake
//! connector, a fake publisher and in-memory output streams.

use crate::address::BluetoothAddress;
use crate::codec::DecodeError;
use crate::measurement::{DeviceRecord, Mode};
use crate::output::console::ConsoleFormatter;
use crate::output::influxdb::InfluxDbFormatter;
use crate::output::{Format, OutputFormatter};
use crate::session::{DeviceSession, SessionConfig};
use crate::throttle::{Throttle, parse_duration};
use crate::transport::{Backend, Transport, TransportError, TransportOptions};
use crate::upload::{
    Gmcmap, HttpPublisher, Publisher, Radmon, URadMonitor, UploadError, Uploader, tube_id,
};
use clap::{Args, Parser};
use std::future::Future;
use std::io;
use std::io::Write;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Transport used to reach the counter
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,

    /// Bluetooth address of the counter (BLE backend).
    /// Format: --address D4:9C:DD:01:02:A3
    /// Without it, the first device advertising as Mon200 is used.
    #[arg(long, env = "RADALERT_ADDRESS")]
    pub address: Option<BluetoothAddress>,

    /// hidraw device node of the counter (HID backend)
    #[arg(long, default_value = "/dev/hidraw0")]
    pub hid_device: PathBuf,

    /// Give up on a read after this long without a frame
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub read_timeout: Duration,

    /// Print at most one record per interval.
    /// Accepts duration with suffix: 500ms, 30s, 5m, 12h, 90d.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub interval: Duration,

    /// Rolling window durations for the CPM statistics, comma separated
    #[arg(
        long = "window",
        value_delimiter = ',',
        default_values = ["5m", "12h", "90d"],
        value_parser = parse_duration,
        value_name = "DURATION"
    )]
    pub windows: Vec<Duration>,

    /// CPM per mR/h conversion factor for a display mode.
    /// Format: --conversion-factor mR/h=1070
    #[arg(long = "conversion-factor", value_parser = parse_conversion_factor, value_name = "MODE=FACTOR")]
    pub conversion_factors: Vec<ConversionFactor>,

    /// Output format
    #[arg(long, default_value_t, value_enum)]
    pub format: Format,

    /// The name of the measurement in InfluxDB line protocol.
    #[arg(long, default_value = "radalert")]
    pub influxdb_measurement: String,

    /// Exit after this many consecutive timeouts or transport failures
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_failures: u32,

    /// Exit after printing this many records
    #[arg(long)]
    pub count: Option<u64>,

    /// Verbose output, print decode errors and enable debug logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    #[command(flatten)]
    pub upload: UploadOptions,
}

/// Credentials for the radiation map services. A service is enabled when
/// all of its required values are present.
#[derive(Args, Debug, Clone)]
pub struct UploadOptions {
    /// Upload at most once per interval
    #[arg(long, default_value = "5m", value_parser = parse_duration)]
    pub upload_interval: Duration,

    #[arg(long, env = "GMCMAP_ACCOUNT")]
    pub gmcmap_account: Option<String>,

    #[arg(long, env = "GMCMAP_GEIGER")]
    pub gmcmap_geiger: Option<String>,

    #[arg(long, env = "RADMON_USER")]
    pub radmon_user: Option<String>,

    #[arg(long, env = "RADMON_PASSWORD", hide_env_values = true)]
    pub radmon_password: Option<String>,

    #[arg(long, env = "URADMONITOR_USER_ID")]
    pub uradmonitor_user_id: Option<String>,

    #[arg(long, env = "URADMONITOR_USER_HASH", hide_env_values = true)]
    pub uradmonitor_user_hash: Option<String>,

    #[arg(long, env = "URADMONITOR_DEVICE_ID")]
    pub uradmonitor_device_id: Option<String>,

    /// Geiger tube model reported to uRadMonitor, e.g. LND-712
    #[arg(long, default_value = "unknown")]
    pub uradmonitor_tube: String,

    /// Hardware version reported to uRadMonitor
    #[arg(long)]
    pub uradmonitor_hw_version: Option<String>,

    /// Firmware version reported to uRadMonitor
    #[arg(long)]
    pub uradmonitor_fw_version: Option<String>,
}

impl UploadOptions {
    /// Uploaders for every fully configured service.
    pub fn uploaders(&self) -> Vec<Box<dyn Uploader>> {
        let mut uploaders: Vec<Box<dyn Uploader>> = Vec::new();

        match (&self.gmcmap_account, &self.gmcmap_geiger) {
            (Some(account_id), Some(geiger_id)) => uploaders.push(Box::new(Gmcmap {
                account_id: account_id.clone(),
                geiger_id: geiger_id.clone(),
            })),
            (None, None) => {}
            _ => log::warn!("GMC.MAP needs both --gmcmap-account and --gmcmap-geiger"),
        }

        match (&self.radmon_user, &self.radmon_password) {
            (Some(user), Some(password)) => uploaders.push(Box::new(Radmon {
                user: user.clone(),
                password: password.clone(),
            })),
            (None, None) => {}
            _ => log::warn!("Radmon needs both --radmon-user and --radmon-password"),
        }

        match (
            &self.uradmonitor_user_id,
            &self.uradmonitor_user_hash,
            &self.uradmonitor_device_id,
        ) {
            (Some(user_id), Some(user_hash), Some(device_id)) => {
                uploaders.push(Box::new(URadMonitor {
                    user_id: user_id.clone(),
                    user_hash: user_hash.clone(),
                    device_id: device_id.clone(),
                    tube: tube_id(&self.uradmonitor_tube),
                    hw_version: self.uradmonitor_hw_version.clone(),
                    fw_version: self.uradmonitor_fw_version.clone(),
                }))
            }
            (None, None, None) => {}
            _ => log::warn!(
                "uRadMonitor needs --uradmonitor-user-id, --uradmonitor-user-hash and --uradmonitor-device-id"
            ),
        }

        uploaders
    }
}

/// Conversion factor for one display mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConversionFactor {
    pub mode: Mode,
    pub factor: f64,
}

/// Parse a conversion factor in `MODE=FACTOR` format.
pub fn parse_conversion_factor(src: &str) -> Result<ConversionFactor, String> {
    let (mode, factor) = src
        .split_once('=')
        .ok_or_else(|| format!("invalid conversion factor '{src}': expected MODE=FACTOR"))?;
    let mode: Mode = mode.parse()?;
    let factor: f64 = factor
        .trim()
        .parse()
        .map_err(|_| format!("invalid conversion factor '{factor}'"))?;
    if !factor.is_finite() || factor <= 0.0 {
        return Err(format!("conversion factor must be positive, got {factor}"));
    }
    Ok(ConversionFactor { mode, factor })
}

impl Options {
    fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            address: self.address,
            hid_device: self.hid_device.clone(),
        }
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            conversion_factors: self
                .conversion_factors
                .iter()
                .map(|c| (c.mode, c.factor))
                .collect(),
            window_durations: self.windows.iter().copied().collect(),
            read_timeout: self.read_timeout,
        }
    }

    /// Label identifying the counter in InfluxDB output.
    fn device_label(&self) -> String {
        match self.backend {
            #[cfg(feature = "bluer")]
            Backend::Ble => self
                .address
                .map(|a| a.to_string())
                .unwrap_or_else(|| "ble".to_string()),
            #[cfg(feature = "hid")]
            Backend::Hid => self.hid_device.display().to_string(),
        }
    }

    fn formatter(&self, config: &SessionConfig) -> Box<dyn OutputFormatter> {
        match self.format {
            Format::Console => Box::new(ConsoleFormatter::new(
                config.window_durations.iter().copied().collect(),
            )),
            Format::Influxdb => Box::new(InfluxDbFormatter::new(
                self.influxdb_measurement.clone(),
                Some(self.device_label()),
            )),
        }
    }
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("giving up after {failures} consecutive failures, last: {last}")]
    TransportLost { failures: u32, last: DecodeError },
}

/// Connector abstraction to enable deterministic unit tests without a device.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        backend: Backend,
        options: TransportOptions,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Transport>, TransportError>> + Send + '_>>;
}

/// Real connector that delegates to the compiled-in backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealConnector;

impl Connector for RealConnector {
    fn connect(
        &self,
        backend: Backend,
        options: TransportOptions,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Transport>, TransportError>> + Send + '_>> {
        Box::pin(async move { crate::transport::open(backend, &options).await })
    }
}

async fn upload(uploaders: &[Box<dyn Uploader>], publisher: &dyn Publisher, record: &DeviceRecord) {
    for uploader in uploaders {
        let request = match uploader.request(record) {
            Ok(Some(request)) => request,
            Ok(None) => {
                log::debug!("Nothing to upload to {} yet", uploader.name());
                continue;
            }
            Err(why) => {
                log::warn!("Cannot build {} upload: {why}", uploader.name());
                continue;
            }
        };
        match publisher.publish(request).await {
            Ok(()) => log::debug!("Uploaded to {}", uploader.name()),
            Err(why) => log::warn!("Upload to {} failed: {why}", uploader.name()),
        }
    }
}

/// Run the core processing loop, writing formatted output to `out` and verbose errors to `err`.
///
/// - Every successful poll feeds the statistics; the emission throttle picks
///   which records are written to `out`.
/// - Uploads run on their own throttle and never end the loop.
/// - Poll errors are logged, and written to `err` when `options.verbose` is
///   true. Transport failures trigger a reconnect; `options.max_failures`
///   consecutive timeouts or transport failures end the loop.
pub async fn run_with_io(
    options: Options,
    connector: &dyn Connector,
    publisher: &dyn Publisher,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), RunError> {
    let config = options.session_config();
    let formatter = options.formatter(&config);
    let uploaders = options.upload.uploaders();

    let mut emit_throttle = Throttle::new(options.interval);
    let mut upload_throttle = Throttle::new(options.upload.upload_interval);

    let transport = connector
        .connect(options.backend, options.transport_options())
        .await?;
    log::info!("Connected to counter over {}", options.backend);
    let mut session = DeviceSession::new(transport, config);

    if let Some(header) = formatter.header() {
        writeln!(out, "{header}")?;
    }

    let mut emitted: u64 = 0;
    let mut failures: u32 = 0;

    while options.count.is_none_or(|count| emitted < count) {
        let error = match session.poll().await {
            Ok(record) => {
                failures = 0;
                let now = Instant::now();
                if emit_throttle.should_emit(now) {
                    writeln!(out, "{}", formatter.format(&record))?;
                    emitted += 1;
                }
                if !uploaders.is_empty() && upload_throttle.should_emit(now) {
                    upload(&uploaders, publisher, &record).await;
                }
                continue;
            }
            Err(error) => error,
        };

        log::warn!("{error}");
        if options.verbose {
            writeln!(err, "{error}")?;
        }

        if !matches!(error, DecodeError::Timeout | DecodeError::TransportFailure(_)) {
            continue;
        }
        failures += 1;
        if failures >= options.max_failures {
            return Err(RunError::TransportLost {
                failures,
                last: error,
            });
        }

        if let DecodeError::TransportFailure(_) = error {
            match connector
                .connect(options.backend, options.transport_options())
                .await
            {
                Ok(transport) => {
                    log::info!("Reconnected to counter");
                    session.reconnect(transport);
                }
                Err(why) => log::warn!("Reconnect failed: {why}"),
            }
        }
    }

    Ok(())
}

/// Run against the real device, printing to stdout and stderr.
pub async fn run(options: Options) -> Result<(), RunError> {
    let publisher = HttpPublisher::new()?;
    run_with_io(
        options,
        &RealConnector,
        &publisher,
        &mut io::stdout(),
        &mut io::stderr(),
    )
    .await
}
