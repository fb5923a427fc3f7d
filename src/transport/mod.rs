//! Byte transports for Radiation Alert counters.
//!
//! A [`Transport`] delivers whole frames: BLE notifications are reassembled
//! into 16-byte frames, HID reports arrive whole. The trait is object safe so
//! the session can be driven by fakes in tests.

#[cfg(feature = "bluer")]
pub mod ble;

#[cfg(feature = "hid")]
pub mod hid;

use crate::address::BluetoothAddress;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a transport.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Nothing arrived within the read timeout
    #[error("no frame within {0:?}")]
    Timeout(Duration),
    /// The device went away
    #[error("device disconnected")]
    Disconnected,
    /// OS level I/O failure
    #[error("I/O error: {0}")]
    Io(String),
    /// Bluetooth stack failure
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// No address was given and discovery found no counter
    #[error("no counter found while scanning, pass its address with --address")]
    MissingAddress,
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        match err.raw_os_error() {
            #[cfg(feature = "hid")]
            Some(libc::ENODEV) => TransportError::Disconnected,
            _ => TransportError::Io(err.to_string()),
        }
    }
}

/// Future returned by [`Transport::read_frame`].
pub type FrameFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<u8>, TransportError>> + Send + 'a>>;

/// Source of complete frames.
pub trait Transport: Send {
    /// Wait up to `timeout` for the next complete frame.
    ///
    /// Dropping the returned future discards any partially received frame;
    /// only complete frames survive across calls.
    fn read_frame(&mut self, timeout: Duration) -> FrameFuture<'_>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_frame(&mut self, timeout: Duration) -> FrameFuture<'_> {
        (**self).read_frame(timeout)
    }
}

/// Splits a byte stream into fixed-length frames.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    frame_len: usize,
    pending: Vec<u8>,
    /// Bytes still due from an abandoned frame
    skip: usize,
}

impl FrameAssembler {
    pub fn new(frame_len: usize) -> Self {
        Self {
            frame_len,
            pending: Vec::with_capacity(frame_len),
            skip: 0,
        }
    }

    /// Append `chunk` and return every frame it completes, in order.
    ///
    /// Leading bytes that belong to a frame dropped by [`clear`](Self::clear)
    /// are discarded first.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let skipped = self.skip.min(chunk.len());
        self.skip -= skipped;
        self.pending.extend_from_slice(&chunk[skipped..]);

        let complete = self.pending.len() / self.frame_len * self.frame_len;
        let frames = self.pending[..complete]
            .chunks_exact(self.frame_len)
            .map(<[u8]>::to_vec)
            .collect();
        self.pending.drain(..complete);
        frames
    }

    /// Abandon an incomplete frame, including the bytes of it that have not
    /// arrived yet.
    pub fn clear(&mut self) {
        if !self.pending.is_empty() {
            self.skip = self.frame_len - self.pending.len();
            self.pending.clear();
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Available transport backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// Bluetooth LE through BlueZ (requires bluetoothd)
    #[cfg(feature = "bluer")]
    Ble,
    /// USB HID through the kernel hidraw interface
    #[cfg(feature = "hid")]
    Hid,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Ble;
        #[cfg(all(feature = "hid", not(feature = "bluer")))]
        return Backend::Hid;
        #[cfg(not(any(feature = "bluer", feature = "hid")))]
        compile_error!("At least one transport feature must be enabled");
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Ble => write!(f, "ble"),
            #[cfg(feature = "hid")]
            Backend::Hid => write!(f, "hid"),
            #[cfg(not(any(feature = "bluer", feature = "hid")))]
            _ => unreachable!("Backend enum has no variants when no transport features are enabled"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            #[cfg(feature = "bluer")]
            "ble" | "bluetooth" | "bluer" => Ok(Backend::Ble),
            #[cfg(feature = "hid")]
            "hid" | "usb" | "hidraw" => Ok(Backend::Hid),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Where to find the device.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportOptions {
    /// Bluetooth address; the BLE backend scans for a counter when absent
    pub address: Option<BluetoothAddress>,
    /// hidraw node used by the HID backend
    pub hid_device: PathBuf,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            address: None,
            hid_device: PathBuf::from("/dev/hidraw0"),
        }
    }
}

/// Connect to a device with the selected backend.
pub async fn open(
    backend: Backend,
    options: &TransportOptions,
) -> Result<Box<dyn Transport>, TransportError> {
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Ble => Ok(Box::new(ble::BleTransport::connect(options.address).await?)),
        #[cfg(feature = "hid")]
        Backend::Hid => Ok(Box::new(hid::HidTransport::open(&options.hid_device)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BLE_FRAME_LEN;
    use crate::test_utils::ble_status_frame;
    use std::str::FromStr;

    #[test]
    fn test_assembler_splits_and_joins_chunks() {
        let mut assembler = FrameAssembler::new(4);
        assert!(assembler.push(&[1, 2]).is_empty());
        assert_eq!(assembler.pending_len(), 2);

        let frames = assembler.push(&[3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(frames, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
        assert_eq!(assembler.pending_len(), 1);

        assert_eq!(assembler.push(&[10, 11, 12]), vec![vec![9, 10, 11, 12]]);
        assert_eq!(assembler.pending_len(), 0);
    }

    #[test]
    fn test_assembler_clear_drops_partial_frame() {
        let mut assembler = FrameAssembler::new(3);
        assembler.push(&[0xAA, 0xBB]);
        assembler.clear();
        assert_eq!(assembler.pending_len(), 0);
        // 0xCC completes the abandoned frame
        assert_eq!(assembler.push(&[0xCC, 1, 2, 3]), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_assembler_clear_skips_rest_of_abandoned_frame() {
        let a = ble_status_frame(18, 1070, 0, 1070, 0b0001_0011, 1);
        let b = ble_status_frame(20, 1070, 0, 1070, 0b0001_0011, 2);

        let mut assembler = FrameAssembler::new(BLE_FRAME_LEN);
        assert!(assembler.push(&a[..10]).is_empty());
        assembler.clear();

        let chunk = [&a[10..], &b[..]].concat();
        assert_eq!(assembler.push(&chunk), vec![b]);
        assert_eq!(assembler.pending_len(), 0);
    }

    #[test]
    fn test_assembler_skip_spans_chunks() {
        let a = ble_status_frame(18, 1070, 0, 1070, 0b0001_0011, 1);
        let b = ble_status_frame(20, 1070, 0, 1070, 0b0001_0011, 2);

        let mut assembler = FrameAssembler::new(BLE_FRAME_LEN);
        assembler.push(&a[..4]);
        assembler.clear();
        assert!(assembler.push(&a[4..9]).is_empty());
        assert_eq!(assembler.pending_len(), 0);
        assert!(assembler.push(&[&a[9..], &b[..8]].concat()).is_empty());
        assert_eq!(assembler.push(&b[8..]), vec![b]);
    }

    #[test]
    fn test_assembler_clear_without_partial_frame() {
        let mut assembler = FrameAssembler::new(3);
        assert_eq!(assembler.push(&[1, 2, 3]), vec![vec![1, 2, 3]]);
        assembler.clear();
        assert_eq!(assembler.push(&[4, 5, 6]), vec![vec![4, 5, 6]]);
    }

    #[test]
    fn test_io_error_mapping() {
        let err = TransportError::from(io::Error::other("boom"));
        assert_eq!(err, TransportError::Io("boom".into()));
    }

    #[cfg(feature = "hid")]
    #[test]
    fn test_enodev_is_disconnect() {
        let err = TransportError::from(io::Error::from_raw_os_error(libc::ENODEV));
        assert_eq!(err, TransportError::Disconnected);
    }

    #[test]
    fn test_transport_error_display() {
        assert_eq!(
            TransportError::Timeout(Duration::from_secs(10)).to_string(),
            "no frame within 10s"
        );
        assert_eq!(TransportError::Disconnected.to_string(), "device disconnected");
    }

    #[cfg(all(feature = "bluer", feature = "hid"))]
    #[test]
    fn test_backend_from_str() {
        assert_eq!(Backend::from_str("ble").unwrap(), Backend::Ble);
        assert_eq!(Backend::from_str("bluetooth").unwrap(), Backend::Ble);
        assert_eq!(Backend::from_str("hid").unwrap(), Backend::Hid);
        assert_eq!(Backend::from_str("usb").unwrap(), Backend::Hid);
        assert!(Backend::from_str("serial").is_err());
    }

    #[cfg(all(feature = "bluer", feature = "hid"))]
    #[test]
    fn test_backend_display() {
        assert_eq!(Backend::Ble.to_string(), "ble");
        assert_eq!(Backend::Hid.to_string(), "hid");
    }

    #[test]
    fn test_boxed_transport_delegates() {
        use crate::test_utils::FakeTransport;

        let mut transport: Box<dyn Transport> =
            Box::new(FakeTransport::frames([vec![1, 2, 3]]));
        let timeout = Duration::from_secs(1);
        assert_eq!(
            tokio_test::block_on(transport.read_frame(timeout)),
            Ok(vec![1, 2, 3])
        );
        assert_eq!(
            tokio_test::block_on(transport.read_frame(timeout)),
            Err(TransportError::Disconnected)
        );
    }
}
