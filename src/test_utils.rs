use crate::measurement::{Measurement, Mode};
use crate::session::{Clock, Tick};
use crate::transport::{FrameFuture, Transport, TransportError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

/// BLE status frame with the given fields.
pub fn ble_status_frame(cps: u32, value: u32, mode: u16, cpm: u32, status: u8, id: u8) -> Vec<u8> {
    let mut frame = Vec::with_capacity(16);
    frame.extend_from_slice(&cps.to_le_bytes());
    frame.extend_from_slice(&value.to_le_bytes());
    frame.extend_from_slice(&mode.to_le_bytes());
    frame.extend_from_slice(&cpm.to_le_bytes());
    frame.push(status);
    frame.push(id);
    frame
}

/// BLE query reply; unknown words zero, trailer `FF`.
pub fn ble_query_frame(alarm_level: u16, conversion_factor: u16) -> Vec<u8> {
    let mut frame = vec![0xFF; 4];
    frame.extend_from_slice(&alarm_level.to_le_bytes());
    frame.extend_from_slice(&[0; 4]);
    frame.extend_from_slice(&conversion_factor.to_le_bytes());
    frame.extend_from_slice(&[0xFF; 4]);
    frame
}

/// `payload` followed by its XOR-8 byte.
pub fn checked_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = payload.to_vec();
    frame.push(crate::codec::checksum::xor8(payload));
    frame
}

/// HID status report with zeroed unknown bytes.
pub fn hid_status_frame(cps: u32, id: u8, value: u32, mode: u8) -> Vec<u8> {
    let mut frame = Vec::with_capacity(15);
    frame.extend_from_slice(&cps.to_le_bytes());
    frame.push(id);
    frame.extend_from_slice(&value.to_le_bytes());
    frame.push(mode);
    frame.extend_from_slice(&[0; 5]);
    frame
}

/// Feature report captured from a factory-fresh 1000EC.
pub fn hid_query_frame() -> Vec<u8> {
    let mut frame = Vec::with_capacity(64);
    frame.extend_from_slice(&[0x00, 0x31, 0x30, 0x31, 0x39, 0x34, 0x38]); // "\0101948"
    frame.extend_from_slice(&[0x00, 0x00, 0x43, 0x6f, 0x2d, 0x36, 0x30]); // "Co-60"
    frame.extend_from_slice(&[0x00, 0x00]);
    frame.push(0x11); // flags
    frame.extend_from_slice(&[0x2e, 0x04]); // alarm 1070
    frame.extend_from_slice(&[0x00, 0x00]);
    frame.push(0x01); // day
    frame.extend_from_slice(&[0x02, 0x17]);
    frame.push(0x01); // month
    frame.push(0x00); // year
    frame.push(0x00);
    frame.push(0x19); // contrast
    frame.extend_from_slice(&[0x67, 0x2B]); // dead time
    for _ in 0..8 {
        frame.extend_from_slice(&[0x10, 0x27]);
    }
    frame.extend_from_slice(&[0x58, 0x02]); // count 600 s
    frame.push(0x07); // backlight
    frame.extend_from_slice(&[0x2e, 0x04]); // conversion 1070
    frame.extend_from_slice(&[0x01, 0x00]); // datalog 1 min
    frame.extend_from_slice(&[0xFF; 11]);
    frame
}

/// A decoded CPM-mode measurement with every optional field empty.
pub fn base_measurement() -> Measurement {
    Measurement {
        timestamp: None,
        sequence: 0,
        battery_percent: None,
        charging: false,
        alarm: None,
        mode: Mode::Cpm,
        raw_value: 0,
        display_value: 0.0,
        instantaneous_count: 0,
        device_cpm: None,
        rate_cpm: None,
        conversion_factor: None,
        reserved: Vec::new(),
    }
}

/// Transport replaying a script of frames and errors, then reporting a
/// disconnect.
#[derive(Debug, Default)]
pub struct FakeTransport {
    script: VecDeque<Result<Vec<u8>, TransportError>>,
}

impl FakeTransport {
    pub fn new(script: impl IntoIterator<Item = Result<Vec<u8>, TransportError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    pub fn frames(frames: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self::new(frames.into_iter().map(Ok))
    }
}

impl Transport for FakeTransport {
    fn read_frame(&mut self, _timeout: Duration) -> FrameFuture<'_> {
        let next = self
            .script
            .pop_front()
            .unwrap_or(Err(TransportError::Disconnected));
        Box::pin(async move { next })
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Tick>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Tick {
                // leave room to go backwards
                instant: Instant::now() + Duration::from_secs(3600),
                wall: SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            })),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        now.instant += by;
        now.wall += by;
    }

    pub fn rewind(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        now.instant -= by;
        now.wall -= by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Tick {
        *self.now.lock().unwrap()
    }
}
