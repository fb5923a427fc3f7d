//! Frame codec for Radiation Alert telemetry.
//!
//! Decodes raw frames received over BLE notifications or USB HID reports
//! into [`Measurement`]s and [`Settings`]. The layout of a frame is identified
//! by its length (and a marker for BLE query replies); checksums are verified
//! before any field is read.
//!
//! The protocol was reverse engineered. Offsets whose meaning is not
//! confirmed are carried through as opaque bytes.

mod ble;
pub mod checksum;
mod hid;

use crate::measurement::{Measurement, Mode};
use crate::settings::Settings;
use crate::transport::TransportError;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Length of a BLE status or query frame.
pub const BLE_FRAME_LEN: usize = 16;

/// Length of a BLE status frame followed by an XOR-8 trailer.
pub const CHECKED_FRAME_LEN: usize = BLE_FRAME_LEN + 1;

/// Length of a HID status report.
pub const HID_STATUS_LEN: usize = 15;

/// Length of a HID feature (query) report, without the report id.
pub const HID_QUERY_LEN: usize = 64;

/// First four bytes of a BLE query reply.
const QUERY_MARKER: [u8; 4] = [0xFF; 4];

/// Errors raised while turning transport bytes into samples.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// No known frame layout has this length
    #[error("Unrecognized frame length: {0} bytes")]
    UnrecognizedLength(usize),
    /// Integrity byte does not match the payload
    #[error("Checksum mismatch: frame carries {expected:#04x}, payload gives {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },
    /// A field holds a value the device cannot produce
    #[error("Field {field} out of range: {value}")]
    FieldOutOfRange { field: &'static str, value: i64 },
    /// A valid frame of a kind the caller did not ask for
    #[error("Unexpected {0} packet")]
    UnexpectedPacket(&'static str),
    /// Sample timestamp precedes the latest accepted sample
    #[error("Sample is {behind:?} older than the latest sample")]
    NonMonotonicSample { behind: Duration },
    /// Negative or non-finite count rate
    #[error("Invalid count rate: {0}")]
    InvalidRate(f64),
    /// Transport could not deliver a frame
    #[error("Transport failure: {0}")]
    TransportFailure(TransportError),
    /// No frame arrived within the read timeout
    #[error("Timed out waiting for a frame")]
    Timeout,
}

impl From<TransportError> for DecodeError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(_) => DecodeError::Timeout,
            other => DecodeError::TransportFailure(other),
        }
    }
}

/// Known frame layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    BleStatus,
    BleQuery,
    CheckedStatus,
    HidStatus,
    HidQuery,
}

impl Layout {
    /// Identify the layout of a frame from its length and marker bytes.
    pub fn identify(frame: &[u8]) -> Result<Layout, DecodeError> {
        match frame.len() {
            BLE_FRAME_LEN if frame.starts_with(&QUERY_MARKER) => Ok(Layout::BleQuery),
            BLE_FRAME_LEN => Ok(Layout::BleStatus),
            CHECKED_FRAME_LEN => Ok(Layout::CheckedStatus),
            HID_STATUS_LEN => Ok(Layout::HidStatus),
            HID_QUERY_LEN => Ok(Layout::HidQuery),
            other => Err(DecodeError::UnrecognizedLength(other)),
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Status(Measurement),
    Settings(Settings),
}

/// Codec configuration: CPM per mR/h conversion factors by mode.
///
/// The factor is device calibrated, so it is supplied here rather than
/// assumed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodecConfig {
    conversion_factors: BTreeMap<Mode, f64>,
}

impl CodecConfig {
    pub fn new(conversion_factors: BTreeMap<Mode, f64>) -> Self {
        Self { conversion_factors }
    }

    pub fn with_factor(mut self, mode: Mode, factor: f64) -> Self {
        self.conversion_factors.insert(mode, factor);
        self
    }

    pub fn conversion_factor(&self, mode: Mode) -> Option<f64> {
        self.conversion_factors.get(&mode).copied()
    }
}

/// Stateless frame decoder.
#[derive(Debug, Clone, Default)]
pub struct FrameCodec {
    config: CodecConfig,
}

impl FrameCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Decode a status frame into a [`Measurement`].
    ///
    /// Query replies are valid frames but carry no measurement; they yield
    /// [`DecodeError::UnexpectedPacket`]. Use [`FrameCodec::decode_packet`]
    /// to accept both.
    pub fn decode(&self, frame: &[u8]) -> Result<Measurement, DecodeError> {
        match self.decode_packet(frame)? {
            Packet::Status(measurement) => Ok(measurement),
            Packet::Settings(_) => Err(DecodeError::UnexpectedPacket("query")),
        }
    }

    /// Decode any known frame.
    pub fn decode_packet(&self, frame: &[u8]) -> Result<Packet, DecodeError> {
        match Layout::identify(frame)? {
            Layout::BleStatus => Ok(Packet::Status(ble::decode_status(frame, &self.config))),
            Layout::CheckedStatus => {
                let (payload, trailer) = frame.split_at(BLE_FRAME_LEN);
                checksum::verify(payload, trailer[0])?;
                Ok(Packet::Status(ble::decode_status(payload, &self.config)))
            }
            Layout::BleQuery => Ok(Packet::Settings(Settings::Ble(ble::decode_query(frame)))),
            Layout::HidStatus => hid::decode_status(frame, &self.config).map(Packet::Status),
            Layout::HidQuery => hid::decode_query(frame).map(|s| Packet::Settings(Settings::Hid(s))),
        }
    }
}

pub(crate) fn u16_at(frame: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([frame[at], frame[at + 1]])
}

pub(crate) fn u32_at(frame: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([frame[at], frame[at + 1], frame[at + 2], frame[at + 3]])
}
