//! Device session: one transport, one codec, one set of rolling windows.
//!
//! Each [`DeviceSession::poll`] reads frames until a status frame arrives,
//! derives the count rate from the time since the previous successful poll
//! and folds it into the statistics. Failures leave the statistics as they
//! were, so a session survives bad frames and timeouts. A timeout or
//! transport failure restarts the rate interval.

use crate::codec::{CodecConfig, DecodeError, FrameCodec, Packet};
use crate::measurement::{DeviceRecord, Mode};
use crate::settings::Settings;
use crate::stats::StatAggregator;
use crate::transport::Transport;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant, SystemTime};

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// 5 minutes, 12 hours and 90 days.
pub const DEFAULT_WINDOWS: [Duration; 3] = [
    Duration::from_secs(5 * 60),
    Duration::from_secs(12 * 60 * 60),
    Duration::from_secs(90 * 24 * 60 * 60),
];

/// Session configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// CPM per mR/h, by display mode
    pub conversion_factors: BTreeMap<Mode, f64>,
    pub window_durations: BTreeSet<Duration>,
    pub read_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            conversion_factors: BTreeMap::new(),
            window_durations: DEFAULT_WINDOWS.into_iter().collect(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// A point in time on both the monotonic and the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub instant: Instant,
    pub wall: SystemTime,
}

/// Time source for a session.
pub trait Clock: Send {
    fn now(&self) -> Tick;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Tick {
        Tick {
            instant: Instant::now(),
            wall: SystemTime::now(),
        }
    }
}

pub struct DeviceSession {
    transport: Box<dyn Transport>,
    codec: FrameCodec,
    stats: StatAggregator,
    clock: Box<dyn Clock>,
    read_timeout: Duration,
    last_tick: Option<Instant>,
    last_sequence: Option<u8>,
    settings: Option<Settings>,
}

impl DeviceSession {
    pub fn new(transport: Box<dyn Transport>, config: SessionConfig) -> Self {
        Self::with_clock(transport, config, Box::new(SystemClock))
    }

    pub fn with_clock(
        transport: Box<dyn Transport>,
        config: SessionConfig,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            codec: FrameCodec::new(CodecConfig::new(config.conversion_factors)),
            stats: StatAggregator::new(config.window_durations),
            clock,
            read_timeout: config.read_timeout,
            last_tick: None,
            last_sequence: None,
            settings: None,
        }
    }

    /// Settings from the most recent query packet.
    pub fn settings(&self) -> Option<&Settings> {
        self.settings.as_ref()
    }

    /// Swap in a fresh transport after a disconnect.
    ///
    /// Statistics are kept. The next poll starts a new rate interval since
    /// the gap says nothing about the count rate.
    pub fn reconnect(&mut self, transport: Box<dyn Transport>) {
        self.transport = transport;
        self.last_tick = None;
        self.last_sequence = None;
    }

    /// Read the next status frame and fold it into the statistics.
    pub async fn poll(&mut self) -> Result<DeviceRecord, DecodeError> {
        let measurement = loop {
            let frame = match self.transport.read_frame(self.read_timeout).await {
                Ok(frame) => frame,
                Err(err) => {
                    // counts from the stalled stretch are lost, so the gap
                    // cannot carry a rate
                    self.last_tick = None;
                    return Err(err.into());
                }
            };
            match self.codec.decode_packet(&frame)? {
                Packet::Status(measurement) => break measurement,
                Packet::Settings(settings) => {
                    log::debug!("Device settings: {settings:?}");
                    self.settings = Some(settings);
                }
            }
        };

        let tick = self.clock.now();
        let rate_cpm = match self.last_tick {
            Some(last) if tick.instant < last => {
                return Err(DecodeError::NonMonotonicSample {
                    behind: last - tick.instant,
                });
            }
            Some(last) => {
                let elapsed = (tick.instant - last).as_secs_f64();
                (elapsed > 0.0).then(|| f64::from(measurement.instantaneous_count) * 60.0 / elapsed)
            }
            None => None,
        };

        if let Some(rate) = rate_cpm {
            self.stats.submit(tick.instant, rate)?;
        }
        self.last_tick = Some(tick.instant);
        self.check_sequence(measurement.sequence);

        let measurement = measurement.observed(tick.wall, rate_cpm);
        Ok(DeviceRecord::new(
            &measurement,
            self.stats.snapshot(),
            self.settings.as_ref().map(Settings::conversion_factor),
        ))
    }

    fn check_sequence(&mut self, sequence: u8) {
        if let Some(last) = self.last_sequence {
            let expected = last.wrapping_add(1);
            if sequence != expected {
                log::warn!("Packet id jumped from {last} to {sequence}");
            }
        }
        self.last_sequence = Some(sequence);
    }
}
