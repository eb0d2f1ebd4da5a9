//! Foreground view of the session.
//!
//! Stands in for the presentation layer: it polls the connection flag on a
//! fixed interval and gates the four input controls on it. Menu entries are
//! read one per line from standard input.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, Result};
use msi_switch_core::InputSource;
use msi_switch_hid::{Delivery, HidResult, Session};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A line entered at the menu prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCommand {
    Select(InputSource),
    Exit,
}

impl MenuCommand {
    /// Parse a menu line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Result<Self, msi_switch_core::Error>> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            return Some(Ok(Self::Exit));
        }
        Some(line.parse().map(Self::Select))
    }
}

/// Read menu lines from standard input on a detached thread.
///
/// The channel closes when standard input does. The thread is never joined;
/// a blocking read cannot be interrupted, so it simply ends with the process.
pub fn spawn_menu_reader() -> Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(8);

    std::thread::Builder::new()
        .name("menu-reader".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read menu input");
                        break;
                    }
                }
            }
            debug!("Menu input closed");
        })
        .context("Failed to spawn menu reader")?;

    Ok(rx)
}

/// The input menu: one control per [`InputSource`].
pub struct ControlPanel {
    session: Arc<Session>,
    enabled: Option<bool>,
}

impl ControlPanel {
    #[must_use]
    pub fn new(session: Arc<Session>) -> Self {
        Self { session, enabled: None }
    }

    /// Whether the input controls are currently enabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }

    /// Poll the session and update the controls.
    ///
    /// Returns the new state when it changed since the last refresh.
    pub fn refresh(&mut self) -> Option<bool> {
        let connected = self.session.status();
        if self.enabled == Some(connected) {
            return None;
        }
        self.enabled = Some(connected);

        let labels: Vec<&str> = InputSource::ALL.iter().map(|source| source.label()).collect();
        if connected {
            info!(controls = ?labels, "Input controls enabled");
        } else {
            info!(controls = ?labels, "Input controls disabled");
        }
        Some(connected)
    }

    /// Act on a menu selection. Disabled controls do nothing.
    ///
    /// # Errors
    /// Returns the session's error if the report cannot be written.
    pub fn select(&self, source: InputSource) -> HidResult<Delivery> {
        if !self.enabled() {
            debug!(input = %source, "Input control disabled, ignoring selection");
            return Ok(Delivery::NoDevice);
        }
        self.session.switch_input(source)
    }
}
