//! hidraw transport for USB counters (Radiation Alert 1000EC and siblings).
//!
//! The counter starts streaming after a start report and keeps re-sending its
//! latest input report until it changes, so repeats are dropped here. Every
//! new report is acknowledged. Settings are read with a GET_FEATURE ioctl,
//! after which streaming has to be restarted.

use super::{FrameFuture, Transport, TransportError};
use crate::codec::HID_QUERY_LEN;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::unix::AsyncFd;

const START: [u8; 8] = [0x46, 0, 0, 0, 0, 0, 0, 0];
const ACK: [u8; 8] = [0; 8];

/// Largest input report the counter sends.
const REPORT_BUF_LEN: usize = 25;

/// Delay before looking again after a repeated report.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Read the feature report every this many new status reports.
const QUERY_EVERY: u64 = 5;

/// `HIDIOCGFEATURE(len)` from `linux/hidraw.h`: `_IOC(_IOC_READ|_IOC_WRITE, 'H', 0x07, len)`.
const fn hidiocgfeature(len: usize) -> libc::c_ulong {
    (3 << 30) | ((len as libc::c_ulong) << 16) | ((b'H' as libc::c_ulong) << 8) | 0x07
}

/// Open hidraw node of a USB counter.
pub struct HidTransport {
    fd: AsyncFd<File>,
    last_report: Option<Vec<u8>>,
    pending: VecDeque<Vec<u8>>,
    reports_seen: u64,
}

impl HidTransport {
    /// Open `path` (e.g. `/dev/hidraw0`) and start streaming.
    pub fn open(path: &Path) -> Result<Self, TransportError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;
        (&file).write_all(&START)?;
        log::info!("Opened {}", path.display());

        Ok(Self {
            fd: AsyncFd::new(file)?,
            last_report: None,
            pending: VecDeque::new(),
            reports_seen: 0,
        })
    }

    async fn read_report(&self) -> Result<Vec<u8>, TransportError> {
        let mut buf = [0u8; REPORT_BUF_LEN];
        loop {
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|inner| {
                let mut file: &File = inner.get_ref();
                file.read(&mut buf)
            }) {
                Ok(Ok(0)) => return Err(TransportError::Disconnected),
                Ok(Ok(n)) => return Ok(buf[..n].to_vec()),
                Ok(Err(err)) => return Err(err.into()),
                Err(_would_block) => continue,
            }
        }
    }

    async fn write_report(&self, report: &[u8]) -> Result<(), TransportError> {
        loop {
            let mut guard = self.fd.writable().await?;
            match guard.try_io(|inner| {
                let mut file: &File = inner.get_ref();
                file.write_all(report)
            }) {
                Ok(result) => return Ok(result?),
                Err(_would_block) => continue,
            }
        }
    }

    fn read_feature(&self) -> Result<Vec<u8>, TransportError> {
        // report id 0 in front of the payload
        let mut buf = [0u8; HID_QUERY_LEN + 1];
        let request = hidiocgfeature(buf.len());
        // SAFETY: `buf` outlives the call and its length is encoded in `request`
        let ret = unsafe { libc::ioctl(self.fd.get_ref().as_raw_fd(), request as _, buf.as_mut_ptr()) };
        if ret < 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(buf[1..].to_vec())
    }

    async fn next_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(frame);
        }

        loop {
            let report = self.read_report().await?;
            if self.last_report.as_ref() == Some(&report) {
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
            log::trace!("report: {report:02x?}");

            self.write_report(&ACK).await?;
            self.last_report = Some(report.clone());
            self.reports_seen += 1;

            if self.reports_seen % QUERY_EVERY == 0 {
                let query = self.read_feature()?;
                self.write_report(&START).await?;
                self.pending.push_back(query);
            }
            return Ok(report);
        }
    }
}

impl Transport for HidTransport {
    fn read_frame(&mut self, timeout: Duration) -> FrameFuture<'_> {
        Box::pin(async move {
            match tokio::time::timeout(timeout, self.next_frame()).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(timeout)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidiocgfeature_request() {
        assert_eq!(hidiocgfeature(65), 0xC041_4807);
    }

    #[tokio::test]
    async fn test_open_missing_device() {
        let result = HidTransport::open(Path::new("/nonexistent/hidraw99"));
        assert!(matches!(result, Err(TransportError::Io(_))));
    }
}
