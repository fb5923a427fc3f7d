//! Uploads to public radiation maps.
//!
//! Each [`Uploader`] turns a [`DeviceRecord`] into an HTTP GET request for
//! one service; a [`Publisher`] sends it. Failed uploads are reported to the
//! caller and not retried, the next interval brings fresher data anyway.

use crate::measurement::DeviceRecord;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use url::Url;

const GMCMAP_URL: &str = "http://www.GMCmap.com/log2.asp";
const RADMON_URL: &str = "http://radmon.org/radmon.php";
const URADMONITOR_URL: &str = "http://data.uradmonitor.com/api/v1/upload/exp";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("invalid upload URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("upload URL cannot carry a path: {0}")]
    NotABase(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A prepared GET request.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
}

impl UploadRequest {
    fn get(url: Url) -> Self {
        Self {
            url,
            headers: Vec::new(),
        }
    }
}

/// Builds the request for one service.
pub trait Uploader: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` while the record lacks the statistics the service needs.
    fn request(&self, record: &DeviceRecord) -> Result<Option<UploadRequest>, UploadError>;
}

/// Account on GMC.MAP.
///
/// Sends the shortest window average as CPM, the next window as ACPM and,
/// with a known conversion factor, the dose rate in µSv/h.
#[derive(Debug, Clone)]
pub struct Gmcmap {
    pub account_id: String,
    pub geiger_id: String,
}

impl Uploader for Gmcmap {
    fn name(&self) -> &'static str {
        "gmcmap"
    }

    fn request(&self, record: &DeviceRecord) -> Result<Option<UploadRequest>, UploadError> {
        let Some(cpm) = record.window_stats(0).map(|s| s.avg) else {
            return Ok(None);
        };

        let mut params = vec![
            ("AID", self.account_id.clone()),
            ("GID", self.geiger_id.clone()),
            ("CPM", format!("{cpm:.2}")),
        ];
        if let Some(acpm) = record.window_stats(1).map(|s| s.avg) {
            params.push(("ACPM", format!("{acpm:.2}")));
        }
        if let Some(factor) = record.effective_conversion_factor() {
            // 1 mR/h ~ 10 µSv/h
            let usv = cpm / factor * 10.0;
            params.push(("uSV", format!("{usv:.5}")));
        }

        let url = Url::parse_with_params(GMCMAP_URL, &params)?;
        Ok(Some(UploadRequest::get(url)))
    }
}

/// Station on radmon.org; reports the shortest window average.
#[derive(Debug, Clone)]
pub struct Radmon {
    pub user: String,
    pub password: String,
}

impl Uploader for Radmon {
    fn name(&self) -> &'static str {
        "radmon"
    }

    fn request(&self, record: &DeviceRecord) -> Result<Option<UploadRequest>, UploadError> {
        let Some(cpm) = record.window_stats(0).map(|s| s.avg) else {
            return Ok(None);
        };

        let url = Url::parse_with_params(
            RADMON_URL,
            &[
                ("function", "submit"),
                ("user", &self.user),
                ("password", &self.password),
                ("value", &format!("{cpm:.2}")),
                ("unit", "CPM"),
            ],
        )?;
        Ok(Some(UploadRequest::get(url)))
    }
}

/// Geiger tubes known to uRadMonitor, by protocol id.
const TUBES: [&str; 14] = [
    "unknown", "SBM-20", "SI-29BG", "SBM-19", "LND-712", "SBM-20M", "SI-22G", "STS-5", "SI-3BG",
    "SBM-21", "SBT-9", "SI-1G", "SI-8B", "SBT-10A",
];

/// uRadMonitor protocol id of a tube model, 0 when unknown.
pub fn tube_id(name: &str) -> u8 {
    TUBES
        .iter()
        .position(|tube| tube.eq_ignore_ascii_case(name))
        .and_then(|i| u8::try_from(i).ok())
        .unwrap_or(0)
}

// parameter ids of the EXP upload protocol
const PARAM_TIME: &str = "1";
const PARAM_CPM: &str = "11";
const PARAM_HW_VERSION: &str = "14";
const PARAM_FW_VERSION: &str = "15";
const PARAM_TUBE: &str = "16";

/// Device on uRadMonitor; reports the shortest window average.
#[derive(Debug, Clone)]
pub struct URadMonitor {
    pub user_id: String,
    pub user_hash: String,
    pub device_id: String,
    pub tube: u8,
    pub hw_version: Option<String>,
    pub fw_version: Option<String>,
}

impl Uploader for URadMonitor {
    fn name(&self) -> &'static str {
        "uradmonitor"
    }

    fn request(&self, record: &DeviceRecord) -> Result<Option<UploadRequest>, UploadError> {
        let Some(cpm) = record.window_stats(0).map(|s| s.avg) else {
            return Ok(None);
        };
        let unix_time = record
            .timestamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let mut url = Url::parse(URADMONITOR_URL)?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| UploadError::NotABase(URADMONITOR_URL.to_string()))?;
            segments
                .push(PARAM_TIME)
                .push(&unix_time.to_string())
                .push(PARAM_CPM)
                .push(&format!("{cpm:.2}"))
                .push(PARAM_TUBE)
                .push(&self.tube.to_string());
            if let Some(hw) = &self.hw_version {
                segments.push(PARAM_HW_VERSION).push(hw);
            }
            if let Some(fw) = &self.fw_version {
                segments.push(PARAM_FW_VERSION).push(fw);
            }
        }

        Ok(Some(UploadRequest {
            url,
            headers: vec![
                ("X-User-id", self.user_id.clone()),
                ("X-User-hash", self.user_hash.clone()),
                ("X-Device-id", self.device_id.clone()),
            ],
        }))
    }
}

/// Sends prepared requests.
pub trait Publisher: Send + Sync {
    fn publish(
        &self,
        request: UploadRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + '_>>;
}

/// Plain HTTP publisher.
#[derive(Debug, Clone)]
pub struct HttpPublisher {
    client: reqwest::Client,
}

impl HttpPublisher {
    pub fn new() -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Publisher for HttpPublisher {
    fn publish(
        &self,
        request: UploadRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + '_>> {
        Box::pin(async move {
            let mut builder = self.client.get(request.url);
            for (name, value) in request.headers {
                builder = builder.header(name, value);
            }
            builder.send().await?.error_for_status()?;
            Ok(())
        })
    }
}
