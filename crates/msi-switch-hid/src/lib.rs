//! MSI Display Switch HID - monitor control over USB HID.
//!
//! This crate owns the device lifecycle for the monitor's HID control
//! interface:
//! - Watching the host for the monitor attaching and detaching
//! - Holding the single open device handle and the connection flag
//! - Writing output reports and logging unsolicited input reports
//!
//! The session loop runs on a dedicated thread (see [`SessionRuntime`]);
//! the rest of the application only polls [`Session::status`] and calls
//! [`Session::send`].

pub mod backend;
pub mod error;
pub mod handle;
pub mod listener;
pub mod runtime;
pub mod session;

pub use backend::{DeviceEvent, HidBackend, WatchMode, open_backend};
pub use error::{HidError, HidResult};
pub use handle::{DeviceHandle, DeviceId, HidapiDevice};
pub use listener::InputListener;
pub use runtime::{SessionOptions, SessionRuntime};
pub use session::{Delivery, Session, SessionSnapshot};
