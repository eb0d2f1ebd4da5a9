//! Device session: the single connection to the monitor.
//!
//! The session owns at most one open [`DeviceHandle`]. Connection state is
//! derived from handle presence, and both live behind one atomically swapped
//! pointer, so readers on other threads never see a handle without the
//! connected flag or the other way round.
//!
//! Only the session loop (see [`Session::run`]) mutates the session.
//! [`Session::status`] and [`Session::send`] are safe to call from anywhere.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwapOption;
use msi_switch_core::{DeviceFilter, InputSource, REPORT_SIZE, validate_output_report};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::backend::{DeviceEvent, HidBackend, open_backend};
use crate::error::HidResult;
use crate::handle::{DeviceHandle, DeviceId};
use crate::listener::InputListener;
use crate::runtime::SessionOptions;

/// Outcome of [`Session::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The report was handed to the transport
    Written(usize),
    /// No device is open; nothing was written
    NoDevice,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Whether a device handle is open
    pub connected: bool,
    /// Identity of the open device
    pub device: Option<DeviceId>,
}

struct ActiveDevice {
    id: DeviceId,
    handle: Arc<dyn DeviceHandle>,
}

/// The monitor session.
pub struct Session {
    filter: DeviceFilter,
    report_size: usize,
    active: ArcSwapOption<ActiveDevice>,
    status_tx: watch::Sender<bool>,
}

impl Session {
    /// Create a disconnected session for devices matching `filter`.
    #[must_use]
    pub fn new(filter: DeviceFilter) -> Self {
        let (status_tx, _) = watch::channel(false);
        Self { filter, report_size: REPORT_SIZE, active: ArcSwapOption::empty(), status_tx }
    }

    /// Override the declared report size.
    #[must_use]
    pub fn with_report_size(mut self, report_size: usize) -> Self {
        self.report_size = report_size;
        self
    }

    #[must_use]
    pub fn filter(&self) -> DeviceFilter {
        self.filter
    }

    #[must_use]
    pub fn report_size(&self) -> usize {
        self.report_size
    }

    /// Whether a device is currently open.
    #[must_use]
    pub fn status(&self) -> bool {
        self.active.load().is_some()
    }

    /// Connection flag and device identity from a single load.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let guard = self.active.load();
        match &*guard {
            Some(active) => SessionSnapshot { connected: true, device: Some(active.id.clone()) },
            None => SessionSnapshot { connected: false, device: None },
        }
    }

    /// Receive connection changes instead of polling [`status`](Self::status).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.status_tx.subscribe()
    }

    /// Write an output report to the open device.
    ///
    /// The first byte of `report` is the report ID. Sending while no device
    /// is open is a no-op that returns [`Delivery::NoDevice`].
    ///
    /// # Errors
    /// Returns [`HidError::Report`](crate::HidError::Report) without writing
    /// if the report is empty or longer than the declared report size, or the
    /// transport error if the write fails.
    pub fn send(&self, report: &[u8]) -> HidResult<Delivery> {
        let report_id = validate_output_report(report, self.report_size).inspect_err(|e| {
            error!(error = %e, "Output report rejected");
        })?;

        let guard = self.active.load();
        let Some(active) = &*guard else {
            debug!(report_id, "No display connected, dropping output report");
            return Ok(Delivery::NoDevice);
        };

        debug!(device = %active.id, report_id, bytes = ?report, "Set output report");
        match active.handle.write_output(report) {
            Ok(written) => Ok(Delivery::Written(written)),
            Err(e) => {
                warn!(device = %active.id, error = %e, "Output report write failed");
                Err(e)
            }
        }
    }

    /// Switch the monitor to `source`.
    ///
    /// # Errors
    /// See [`send`](Self::send).
    pub fn switch_input(&self, source: InputSource) -> HidResult<Delivery> {
        info!(input = %source, "Switching monitor input");
        self.send(&source.payload())
    }

    /// Store a newly matched device. The most recent match wins.
    pub fn on_device_matched(&self, handle: Arc<dyn DeviceHandle>) {
        let id = handle.id();
        info!(device = %id, description = %handle.describe(), "Display connected");

        if let Some(previous) = self.active.swap(Some(Arc::new(ActiveDevice { id, handle }))) {
            warn!(device = %previous.id, "Replacing previously connected display");
        }
        self.status_tx.send_replace(true);
    }

    /// Drop the handle if `id` is the open device.
    ///
    /// Returns `false` and leaves the session untouched when the removed
    /// device is not the one currently open.
    pub fn on_device_removed(&self, id: &DeviceId) -> bool {
        let current = self.active.load_full();
        match current {
            Some(active) if active.id == *id => {
                self.active.store(None);
                self.status_tx.send_replace(false);
                info!(device = %id, "Display disconnected");
                true
            }
            Some(active) => {
                debug!(removed = %id, open = %active.id, "Ignoring removal of another device");
                false
            }
            None => {
                debug!(removed = %id, "Removal while disconnected");
                false
            }
        }
    }

    /// Drop whatever handle is open.
    pub fn disconnect(&self) {
        if let Some(previous) = self.active.swap(None) {
            info!(device = %previous.id, "Display session closed");
            self.status_tx.send_replace(false);
        }
    }

    /// Create the host HID context and service notifications until
    /// `shutdown` is set.
    ///
    /// `on_ready` runs once the context is up and callbacks are registered,
    /// just before the loop starts. This call blocks for the life of the
    /// session.
    ///
    /// # Errors
    /// Returns an error if the HID subsystem cannot be initialized.
    pub fn connect(
        &self,
        options: &SessionOptions,
        shutdown: &AtomicBool,
        on_ready: impl FnOnce(),
    ) -> HidResult<()> {
        self.connect_with(options, shutdown, on_ready, open_backend)
    }

    /// [`connect`](Self::connect) with a caller-supplied backend factory.
    ///
    /// # Errors
    /// Returns the factory's error; `on_ready` is not called in that case.
    pub fn connect_with<F>(
        &self,
        options: &SessionOptions,
        shutdown: &AtomicBool,
        on_ready: impl FnOnce(),
        make_backend: F,
    ) -> HidResult<()>
    where
        F: FnOnce(DeviceFilter, &SessionOptions) -> HidResult<Box<dyn HidBackend>>,
    {
        info!(filter = %self.filter, "Starting display controller");
        let mut backend = make_backend(self.filter, options)?;
        on_ready();
        self.run(backend.as_mut(), options, shutdown);
        Ok(())
    }

    /// Service device notifications from `backend` until `shutdown` is set.
    ///
    /// On exit the open device, if any, is released.
    pub fn run(
        &self,
        backend: &mut dyn HidBackend,
        options: &SessionOptions,
        shutdown: &AtomicBool,
    ) {
        let mut listener: Option<InputListener> = None;
        let mut pending: Option<PendingOpen> = None;

        while !shutdown.load(Ordering::Relaxed) {
            let events = match backend.wait_events(options.event_timeout) {
                Ok(events) => events,
                Err(e) => {
                    warn!(error = %e, "Device notification wait failed");
                    std::thread::sleep(options.event_timeout);
                    continue;
                }
            };

            for event in events {
                match event {
                    DeviceEvent::Arrived(id) => {
                        debug!(device = %id, "Matching device arrived");
                        pending = Some(PendingOpen { id, attempts: 0 });
                    }
                    DeviceEvent::Left(id) => {
                        if pending.as_ref().is_some_and(|p| p.id == id) {
                            pending = None;
                        }
                        if self.on_device_removed(&id)
                            && let Some(listener) = listener.take()
                        {
                            listener.stop();
                        }
                    }
                }
            }

            if let Some(mut open) = pending.take() {
                match backend.open(&open.id) {
                    Ok(handle) => {
                        if let Some(previous) = listener.take() {
                            previous.stop();
                        }
                        self.on_device_matched(Arc::clone(&handle));
                        if options.listen_input {
                            listener = self.arm_listener(handle, options);
                        }
                    }
                    Err(e) => {
                        open.attempts += 1;
                        if open.attempts < options.open_retries {
                            warn!(
                                device = %open.id,
                                attempt = open.attempts,
                                error = %e,
                                "Failed to open display, will retry"
                            );
                            pending = Some(open);
                        } else {
                            error!(device = %open.id, error = %e, "Giving up opening display");
                        }
                    }
                }
            }
        }

        if let Some(listener) = listener.take() {
            listener.stop();
        }
        self.disconnect();
        info!("Display controller stopped");
    }

    fn arm_listener(
        &self,
        handle: Arc<dyn DeviceHandle>,
        options: &SessionOptions,
    ) -> Option<InputListener> {
        match InputListener::spawn(handle, self.report_size, options.read_timeout) {
            Ok(listener) => Some(listener),
            Err(e) => {
                warn!(error = %e, "Failed to start input report listener");
                None
            }
        }
    }
}

/// A matched device whose handle has not been opened yet.
struct PendingOpen {
    id: DeviceId,
    attempts: u32,
}
