//! Session runtime.
//!
//! Runs the session loop on a dedicated thread. The host HID context is
//! created on that thread, and the outcome is reported back before
//! [`SessionRuntime::spawn`] returns, so a broken HID stack fails startup
//! instead of leaving a session that can never connect.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use msi_switch_core::DeviceFilter;
use tracing::{error, info, warn};

use crate::backend::{HidBackend, WatchMode, open_backend};
use crate::error::{HidError, HidResult};
use crate::session::Session;

/// Tuning for the session loop.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// How device notifications are obtained
    pub mode: WatchMode,
    /// Longest wait for notifications before checking for shutdown
    pub event_timeout: Duration,
    /// Enumeration interval when polling
    pub poll_interval: Duration,
    /// Input report read timeout
    pub read_timeout: Duration,
    /// Attempts to open a matched device before giving up
    pub open_retries: u32,
    /// Log unsolicited input reports
    pub listen_input: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            mode: WatchMode::Auto,
            event_timeout: Duration::from_millis(250),
            poll_interval: Duration::from_secs(1),
            read_timeout: Duration::from_millis(100),
            open_retries: 5,
            listen_input: true,
        }
    }
}

/// Handle to the background session thread.
#[derive(Debug)]
pub struct SessionRuntime {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SessionRuntime {
    /// Spawn the session thread and wait until the HID context is up.
    ///
    /// # Errors
    /// Returns the initialization error if the host HID subsystem cannot be
    /// set up, or an error if the thread cannot be spawned.
    pub fn spawn(session: Arc<Session>, options: SessionOptions) -> HidResult<Self> {
        Self::spawn_with(session, options, open_backend)
    }

    /// [`spawn`](Self::spawn) with a caller-supplied backend factory.
    ///
    /// The factory runs on the session thread.
    ///
    /// # Errors
    /// Returns the factory's error, or an error if the thread cannot be
    /// spawned.
    pub fn spawn_with<F>(
        session: Arc<Session>,
        options: SessionOptions,
        make_backend: F,
    ) -> HidResult<Self>
    where
        F: FnOnce(DeviceFilter, &SessionOptions) -> HidResult<Box<dyn HidBackend>>
            + Send
            + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);
        let (ready_tx, ready_rx) = std_mpsc::channel();

        let thread = std::thread::Builder::new()
            .name("hid-session".to_string())
            .spawn(move || {
                let ready = ready_tx.clone();
                let on_ready = move || {
                    let _ = ready.send(Ok(()));
                };
                let result =
                    session.connect_with(&options, &shutdown_flag, on_ready, make_backend);
                if let Err(e) = result {
                    error!(error = %e, "HID subsystem initialization failed");
                    let _ = ready_tx.send(Err(e));
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("HID session running");
                Ok(Self { shutdown, thread: Some(thread) })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(HidError::SubsystemInit("session thread exited during startup".to_string()))
            }
        }
    }

    /// Ask the session loop to stop after its current wait.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Whether the session thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the session loop and wait for the thread to exit.
    pub fn join(mut self) {
        self.shutdown();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("HID session thread panicked");
        }
    }
}

impl Drop for SessionRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DeviceEvent;
    use crate::handle::{DeviceHandle, DeviceId, MockDeviceHandle};
    use assert_matches::assert_matches;
    use std::time::Instant;

    /// Announces one device on the first wait, then idles.
    struct SingleDeviceBackend {
        device: Option<Arc<dyn DeviceHandle>>,
        announced: bool,
    }

    impl HidBackend for SingleDeviceBackend {
        fn wait_events(&mut self, timeout: Duration) -> HidResult<Vec<DeviceEvent>> {
            if !self.announced {
                self.announced = true;
                return Ok(vec![DeviceEvent::Arrived(DeviceId::new("usb:001:004"))]);
            }
            std::thread::sleep(timeout);
            Ok(Vec::new())
        }

        fn open(&mut self, id: &DeviceId) -> HidResult<Arc<dyn DeviceHandle>> {
            self.device.take().ok_or_else(|| HidError::DeviceNotFound(id.to_string()))
        }
    }

    fn quiet_options() -> SessionOptions {
        SessionOptions {
            event_timeout: Duration::from_millis(5),
            listen_input: false,
            ..SessionOptions::default()
        }
    }

    fn monitor() -> Arc<dyn DeviceHandle> {
        let mut mock = MockDeviceHandle::new();
        mock.expect_id().return_const(DeviceId::new("usb:001:004"));
        mock.expect_describe().return_const("MSI monitor".to_string());
        Arc::new(mock)
    }

    fn single_device() -> HidResult<Box<dyn HidBackend>> {
        Ok(Box::new(SingleDeviceBackend { device: Some(monitor()), announced: false }))
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_spawn_fails_when_backend_cannot_start() {
        let session = Arc::new(Session::new(DeviceFilter::default()));
        let attempted = Arc::new(AtomicBool::new(false));
        let attempted_flag = Arc::clone(&attempted);

        let options = quiet_options();
        let result = SessionRuntime::spawn_with(Arc::clone(&session), options, move |_, _| {
            attempted_flag.store(true, Ordering::SeqCst);
            Err(HidError::SubsystemInit("libusb: no such device".to_string()))
        });

        assert_matches!(result, Err(HidError::SubsystemInit(_)));
        assert!(attempted.load(Ordering::SeqCst));
        assert!(!session.status());
        // The failed thread has been joined and released its session clone.
        assert_eq!(Arc::strong_count(&session), 1);
    }

    #[test]
    fn test_spawn_returns_after_backend_is_up() {
        let session = Arc::new(Session::new(DeviceFilter::default()));
        let created = Arc::new(AtomicBool::new(false));
        let created_flag = Arc::clone(&created);

        let options = quiet_options();
        let runtime = SessionRuntime::spawn_with(Arc::clone(&session), options, move |_, _| {
            std::thread::sleep(Duration::from_millis(50));
            created_flag.store(true, Ordering::SeqCst);
            single_device()
        })
        .unwrap();

        assert!(created.load(Ordering::SeqCst));
        assert!(!runtime.is_finished());
        runtime.join();
    }

    #[test]
    fn test_join_stops_loop_and_disconnects() {
        let session = Arc::new(Session::new(DeviceFilter::default()));

        let runtime =
            SessionRuntime::spawn_with(Arc::clone(&session), quiet_options(), |_, _| {
                single_device()
            })
            .unwrap();

        assert!(wait_until(|| session.status()));
        runtime.join();

        assert!(!session.status());
        assert_eq!(Arc::strong_count(&session), 1);
    }

    #[test]
    fn test_default_options() {
        let options = SessionOptions::default();

        assert_eq!(options.mode, WatchMode::Auto);
        assert_eq!(options.poll_interval, Duration::from_secs(1));
        assert_eq!(options.open_retries, 5);
        assert!(options.listen_input);
        assert!(options.event_timeout < options.poll_interval);
    }
}
