//! Host HID access context.
//!
//! A backend watches the host for devices matching the [`DeviceFilter`] and
//! opens them on request. Two implementations exist: libusb hot-plug
//! notifications (Linux, macOS) and periodic hidapi enumeration for hosts
//! where libusb cannot deliver hot-plug events.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::CString;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use hidapi::HidApi;
use msi_switch_core::DeviceFilter;
use rusb::UsbContext;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{HidError, HidResult};
use crate::handle::{DeviceHandle, DeviceId, HidapiDevice};
use crate::runtime::SessionOptions;

/// Device notification delivered by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A device matching the filter attached (or was present at start)
    Arrived(DeviceId),
    /// A device matching the filter detached
    Left(DeviceId),
}

/// How the session learns about attached devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// Hot-plug when libusb supports it, polling otherwise
    #[default]
    Auto,
    /// libusb hot-plug notifications only
    Hotplug,
    /// Periodic hidapi enumeration
    Polling,
}

/// Source of device notifications and device handles.
pub trait HidBackend {
    /// Wait up to `timeout` for device notifications.
    ///
    /// # Errors
    /// Returns an error if the underlying event machinery fails.
    fn wait_events(&mut self, timeout: Duration) -> HidResult<Vec<DeviceEvent>>;

    /// Open the device behind a previously announced identity.
    ///
    /// # Errors
    /// Returns an error if the device is gone or cannot be opened.
    fn open(&mut self, id: &DeviceId) -> HidResult<Arc<dyn DeviceHandle>>;
}

/// Create the backend selected by `options.mode`.
///
/// # Errors
/// Returns [`HidError::SubsystemInit`] or [`HidError::Registration`] if the
/// host HID subsystem cannot be set up.
pub fn open_backend(
    filter: DeviceFilter,
    options: &SessionOptions,
) -> HidResult<Box<dyn HidBackend>> {
    match options.mode {
        WatchMode::Hotplug => {
            if !rusb::has_hotplug() {
                return Err(HidError::SubsystemInit(
                    "libusb hot-plug is not supported on this platform".to_string(),
                ));
            }
            Ok(Box::new(HotplugBackend::new(filter)?))
        }
        WatchMode::Polling => Ok(Box::new(PollingBackend::new(filter, options.poll_interval)?)),
        WatchMode::Auto if rusb::has_hotplug() => match HotplugBackend::new(filter) {
            Ok(backend) => Ok(Box::new(backend)),
            Err(e) => {
                warn!(error = %e, "Hot-plug setup failed, falling back to polling");
                Ok(Box::new(PollingBackend::new(filter, options.poll_interval)?))
            }
        },
        WatchMode::Auto => {
            info!("libusb hot-plug unavailable, polling HID devices");
            Ok(Box::new(PollingBackend::new(filter, options.poll_interval)?))
        }
    }
}

fn init_hidapi() -> HidResult<HidApi> {
    HidApi::new().map_err(|e| HidError::SubsystemInit(format!("hidapi: {e}")))
}

/// Open the first hidapi device matching `filter`, or the one at `path`.
fn open_hid_device(
    api: &HidApi,
    filter: DeviceFilter,
    id: &DeviceId,
    path: Option<&CString>,
) -> HidResult<Arc<dyn DeviceHandle>> {
    let info = api
        .device_list()
        .find(|d| match path {
            Some(path) => d.path() == path.as_c_str(),
            None => filter.matches(d.vendor_id(), d.product_id()),
        })
        .ok_or_else(|| HidError::DeviceNotFound(id.to_string()))?;

    let device = api.open_path(info.path()).map_err(|e| HidError::OpenFailed {
        device: id.to_string(),
        reason: e.to_string(),
    })?;

    debug!(device = %id, path = ?info.path(), "HID device opened");
    Ok(Arc::new(HidapiDevice::new(id.clone(), device, info)))
}

/// Forwards libusb hot-plug callbacks into a channel.
///
/// Runs inside `handle_events`, so it only enqueues.
struct HotplugForwarder {
    tx: mpsc::Sender<DeviceEvent>,
}

impl rusb::Hotplug<rusb::Context> for HotplugForwarder {
    fn device_arrived(&mut self, device: rusb::Device<rusb::Context>) {
        let id = DeviceId::usb(device.bus_number(), device.address());
        debug!(device = %id, "USB device arrived");
        let _ = self.tx.send(DeviceEvent::Arrived(id));
    }

    fn device_left(&mut self, device: rusb::Device<rusb::Context>) {
        let id = DeviceId::usb(device.bus_number(), device.address());
        debug!(device = %id, "USB device left");
        let _ = self.tx.send(DeviceEvent::Left(id));
    }
}

/// Backend driven by libusb hot-plug notifications.
///
/// Reports are still exchanged through hidapi; libusb only tells us when
/// the monitor comes and goes.
pub struct HotplugBackend {
    filter: DeviceFilter,
    context: rusb::Context,
    events: mpsc::Receiver<DeviceEvent>,
    api: HidApi,
    _registration: rusb::Registration<rusb::Context>,
}

impl HotplugBackend {
    /// Create a libusb context and register for matching devices.
    ///
    /// Devices already attached are reported by the first
    /// [`wait_events`](HidBackend::wait_events) call.
    ///
    /// # Errors
    /// Returns an error if libusb or hidapi cannot be initialized, or the
    /// hot-plug callback cannot be registered.
    pub fn new(filter: DeviceFilter) -> HidResult<Self> {
        let context = rusb::Context::new()
            .map_err(|e| HidError::SubsystemInit(format!("libusb: {e}")))?;
        let api = init_hidapi()?;

        let (tx, events) = mpsc::channel();
        let registration = rusb::HotplugBuilder::new()
            .vendor_id(filter.vendor_id)
            .product_id(filter.product_id)
            .enumerate(true)
            .register(&context, Box::new(HotplugForwarder { tx }))
            .map_err(|e| HidError::Registration(e.to_string()))?;

        info!(filter = %filter, "Registered for USB hot-plug notifications");

        Ok(Self { filter, context, events, api, _registration: registration })
    }
}

impl HidBackend for HotplugBackend {
    fn wait_events(&mut self, timeout: Duration) -> HidResult<Vec<DeviceEvent>> {
        self.context.handle_events(Some(timeout))?;
        Ok(self.events.try_iter().collect())
    }

    fn open(&mut self, id: &DeviceId) -> HidResult<Arc<dyn DeviceHandle>> {
        // The hidraw node can trail the USB arrival; refresh on every attempt.
        self.api.refresh_devices()?;
        open_hid_device(&self.api, self.filter, id, None)
    }
}

/// Backend that enumerates HID devices on a fixed interval.
pub struct PollingBackend {
    filter: DeviceFilter,
    api: HidApi,
    interval: Duration,
    attached: BTreeMap<DeviceId, CString>,
    last_scan: Option<Instant>,
}

impl PollingBackend {
    /// # Errors
    /// Returns an error if hidapi cannot be initialized.
    pub fn new(filter: DeviceFilter, interval: Duration) -> HidResult<Self> {
        let api = init_hidapi()?;
        info!(filter = %filter, ?interval, "Polling for HID devices");
        Ok(Self { filter, api, interval, attached: BTreeMap::new(), last_scan: None })
    }

    fn scan(&mut self) -> HidResult<Vec<DeviceEvent>> {
        self.api.refresh_devices()?;

        let current: BTreeMap<DeviceId, CString> = self
            .api
            .device_list()
            .filter(|d| self.filter.matches(d.vendor_id(), d.product_id()))
            .map(|d| (DeviceId::new(d.path().to_string_lossy()), d.path().to_owned()))
            .collect();

        let previous: BTreeSet<DeviceId> = self.attached.keys().cloned().collect();
        let now: BTreeSet<DeviceId> = current.keys().cloned().collect();
        let events = diff_attached(&previous, &now);

        self.attached = current;
        self.last_scan = Some(Instant::now());
        Ok(events)
    }
}

impl HidBackend for PollingBackend {
    fn wait_events(&mut self, timeout: Duration) -> HidResult<Vec<DeviceEvent>> {
        if let Some(last) = self.last_scan {
            let remaining = self.interval.saturating_sub(last.elapsed());
            if remaining > timeout {
                std::thread::sleep(timeout);
                return Ok(Vec::new());
            }
            std::thread::sleep(remaining);
        }
        self.scan()
    }

    fn open(&mut self, id: &DeviceId) -> HidResult<Arc<dyn DeviceHandle>> {
        let path = self
            .attached
            .get(id)
            .ok_or_else(|| HidError::DeviceNotFound(id.to_string()))?;
        open_hid_device(&self.api, self.filter, id, Some(path))
    }
}

/// Compare two enumerations. Removals come before arrivals.
fn diff_attached(previous: &BTreeSet<DeviceId>, current: &BTreeSet<DeviceId>) -> Vec<DeviceEvent> {
    let left = previous.difference(current).cloned().map(DeviceEvent::Left);
    let arrived = current.difference(previous).cloned().map(DeviceEvent::Arrived);
    left.chain(arrived).collect()
}
