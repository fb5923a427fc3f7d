//! BlueZ D-Bus transport for BLE counters (Radiation Alert Ranger, Monitor
//! 200 and similar).
//!
//! The counter exposes the Microchip "Transparent UART" GATT service. It
//! streams status frames as notifications on the TX characteristic and stops
//! unless every notification is acknowledged with `X\n` written to the RX
//! characteristic. A `?\n` command makes it send one query reply; the
//! command must be written before the acknowledgement.

use super::{FrameAssembler, FrameFuture, Transport, TransportError};
use crate::address::BluetoothAddress;
use crate::codec::BLE_FRAME_LEN;
use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, AdapterEvent, Address, Device, Session, Uuid};
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

const UART_SERVICE: Uuid = Uuid::from_u128(0x49535343_fe7d_4ae5_8fa9_9fafd205e455);
/// Device to host (notify)
const UART_TX: Uuid = Uuid::from_u128(0x49535343_1e4d_4bd9_ba61_23c647249616);
/// Host to device (write)
const UART_RX: Uuid = Uuid::from_u128(0x49535343_8841_43f4_a8d4_ecbe34729bb3);

const ACK: &[u8] = b"X\n";
const QUERY: &[u8] = b"?\n";

/// Request settings every this many notifications.
const QUERY_EVERY: u64 = 5;

const RESOLVE_POLL: Duration = Duration::from_millis(100);
const RESOLVE_ATTEMPTS: u32 = 100;

/// Counters advertise a local name containing this.
const ADVERTISED_NAME: &str = "Mon200";
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

impl From<bluer::Error> for TransportError {
    fn from(err: bluer::Error) -> Self {
        TransportError::Bluetooth(err.to_string())
    }
}

type Notifications = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Connected BLE counter.
pub struct BleTransport {
    // the session must outlive the device handles
    _session: Session,
    device: Device,
    rx: Characteristic,
    notifications: Notifications,
    assembler: FrameAssembler,
    ready: VecDeque<Vec<u8>>,
    notifications_seen: u64,
    reading: bool,
}

impl BleTransport {
    /// Connect to the counter at `address`, or to the first one found by
    /// scanning, and subscribe to its status stream.
    pub async fn connect(address: Option<BluetoothAddress>) -> Result<Self, TransportError> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;

        let address = match address {
            Some(address) => address,
            None => discover(&adapter).await?.into(),
        };
        let device = adapter.device(address.into())?;
        if !device.is_connected().await? {
            log::info!("Connecting to {address}");
            device.connect().await?;
        }
        wait_for_services(&device).await?;

        let (tx, rx) = find_uart(&device).await?;
        let notifications: Notifications = Box::pin(tx.notify().await?);
        log::info!("Subscribed to {address}");

        Ok(Self {
            _session: session,
            device,
            rx,
            notifications,
            assembler: FrameAssembler::new(BLE_FRAME_LEN),
            ready: VecDeque::new(),
            notifications_seen: 0,
            reading: false,
        })
    }

    async fn next_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(frame);
            }

            let chunk = self
                .notifications
                .next()
                .await
                .ok_or(TransportError::Disconnected)?;
            log::trace!("notification: {chunk:02x?}");

            self.ready.extend(self.assembler.push(&chunk));
            self.notifications_seen += 1;

            if self.notifications_seen % QUERY_EVERY == 0 {
                self.rx.write(QUERY).await?;
            }
            self.rx.write(ACK).await?;
        }
    }
}

impl Transport for BleTransport {
    fn read_frame(&mut self, timeout: Duration) -> FrameFuture<'_> {
        Box::pin(async move {
            if self.reading {
                // previous read was dropped mid-frame
                self.assembler.clear();
            }

            self.reading = true;
            let result = tokio::time::timeout(timeout, self.next_frame()).await;
            self.reading = false;

            match result {
                Ok(Ok(frame)) => Ok(frame),
                Ok(Err(err)) => {
                    self.assembler.clear();
                    Err(err)
                }
                Err(_) => {
                    self.assembler.clear();
                    Err(TransportError::Timeout(timeout))
                }
            }
        })
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        let device = self.device.clone();
        // best effort; there may be no runtime left during shutdown
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = device.disconnect().await;
            });
        }
    }
}

fn is_counter_name(name: &str) -> bool {
    name.contains(ADVERTISED_NAME)
}

/// Scan until a device advertising as a counter shows up.
async fn discover(adapter: &Adapter) -> Result<Address, TransportError> {
    log::info!("Scanning for {ADVERTISED_NAME} devices");
    let events = adapter.discover_devices().await?;
    let mut events = std::pin::pin!(events);

    let scan = async {
        while let Some(event) = events.next().await {
            let AdapterEvent::DeviceAdded(address) = event else {
                continue;
            };
            let name = match adapter.device(address) {
                Ok(device) => device.name().await,
                Err(err) => Err(err),
            };
            match name {
                Ok(Some(name)) if is_counter_name(&name) => {
                    log::info!("Found {name} at {address}");
                    return Some(address);
                }
                Ok(_) => {}
                Err(err) => log::debug!("Skipping {address}: {err}"),
            }
        }
        None
    };

    // dropping the event stream stops discovery
    tokio::time::timeout(DISCOVERY_TIMEOUT, scan)
        .await
        .ok()
        .flatten()
        .ok_or(TransportError::MissingAddress)
}

async fn wait_for_services(device: &Device) -> Result<(), TransportError> {
    for _ in 0..RESOLVE_ATTEMPTS {
        if device.is_services_resolved().await? {
            return Ok(());
        }
        tokio::time::sleep(RESOLVE_POLL).await;
    }
    Err(TransportError::Bluetooth(
        "timed out resolving GATT services".into(),
    ))
}

async fn find_uart(device: &Device) -> Result<(Characteristic, Characteristic), TransportError> {
    for service in device.services().await? {
        if service.uuid().await? != UART_SERVICE {
            continue;
        }

        let mut tx = None;
        let mut rx = None;
        for characteristic in service.characteristics().await? {
            match characteristic.uuid().await? {
                uuid if uuid == UART_TX => tx = Some(characteristic),
                uuid if uuid == UART_RX => rx = Some(characteristic),
                _ => {}
            }
        }

        if let (Some(tx), Some(rx)) = (tx, rx) {
            return Ok((tx, rx));
        }
    }

    Err(TransportError::Bluetooth(
        "Transparent UART service not found".into(),
    ))
}
