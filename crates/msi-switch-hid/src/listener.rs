//! Input report listener.
//!
//! The monitor occasionally sends unsolicited input reports. Nothing in the
//! protocol depends on them, so they are read on a side thread and logged.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::HidResult;
use crate::handle::DeviceHandle;

/// Pause after a failed read before trying again.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(250);

/// Background reader for one device's input reports.
pub struct InputListener {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl InputListener {
    /// Start listening on `handle` for reports up to `report_size` bytes.
    ///
    /// # Errors
    /// Returns an error if the reader thread cannot be spawned.
    pub fn spawn(
        handle: Arc<dyn DeviceHandle>,
        report_size: usize,
        read_timeout: Duration,
    ) -> HidResult<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("hid-input-reader".to_string())
            .spawn(move || read_loop(handle.as_ref(), report_size, read_timeout, &stop_flag))?;

        Ok(Self { stop, thread: Some(thread) })
    }

    /// Ask the reader thread to exit after its current read.
    ///
    /// Does not wait for the thread.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Stop the reader and wait for it to finish.
    pub fn join(mut self) {
        self.stop();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("Input reader thread panicked");
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for InputListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop(handle: &dyn DeviceHandle, report_size: usize, timeout: Duration, stop: &AtomicBool) {
    let device = handle.id();
    debug!(device = %device, report_size, "Input reader started");
    let mut buf = vec![0u8; report_size];

    while !stop.load(Ordering::Relaxed) {
        match handle.read_input(&mut buf, timeout) {
            Ok(0) => {}
            Ok(len) => {
                debug!(device = %device, len, report = ?&buf[..len], "Input report received");
            }
            Err(e) => {
                warn!(device = %device, error = %e, "Input report read failed");
                std::thread::sleep(READ_ERROR_BACKOFF);
            }
        }
    }

    debug!(device = %device, "Input reader exiting");
}
