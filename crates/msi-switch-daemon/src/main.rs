//! MSI Display Switch daemon.
//!
//! Hosts the monitor session: the HID notification loop runs on its own
//! thread while the foreground polls the connection flag, keeps the input
//! controls in step with it, and acts on menu lines from standard input.

use std::sync::Arc;

use anyhow::{Context, Result};
use msi_switch_core::{DeviceFilter, InputSource};
use msi_switch_hid::{HidBackend, HidResult, Session, SessionOptions, SessionRuntime, open_backend};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod panel;
mod signals;

use panel::{ControlPanel, MenuCommand};

/// Crates whose level follows `daemon.log_level`.
const LOG_TARGETS: &[&str] = &["msi_switch_core", "msi_switch_hid", "msi_switch_daemon"];

/// Start the session thread without stalling the async runtime.
///
/// [`SessionRuntime::spawn_with`] blocks until the HID context is up, so it
/// runs on the blocking pool.
async fn start_runtime<F>(
    session: Arc<Session>,
    options: SessionOptions,
    make_backend: F,
) -> Result<SessionRuntime>
where
    F: FnOnce(DeviceFilter, &SessionOptions) -> HidResult<Box<dyn HidBackend>> + Send + 'static,
{
    tokio::task::spawn_blocking(move || SessionRuntime::spawn_with(session, options, make_backend))
        .await
        .context("Display controller startup panicked")?
        .context("Failed to start display controller")
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, config_path) = config::load_config()?;

    // Initialize logging
    let mut filter = EnvFilter::from_default_env();
    for target in LOG_TARGETS {
        filter = filter.add_directive(
            format!("{target}={}", config.daemon.log_level)
                .parse()
                .with_context(|| format!("Invalid log level {:?}", config.daemon.log_level))?,
        );
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting MSI Display Switch daemon");
    if config_path.exists() {
        info!(path = ?config_path, "Configuration loaded");
    } else {
        info!(path = ?config_path, "No configuration file, using defaults");
    }

    let filter = config.device.filter()?;
    let session = Arc::new(Session::new(filter).with_report_size(config.device.report_size()?));

    let runtime =
        start_runtime(Arc::clone(&session), config.device.session_options(), open_backend)
            .await?;

    let mut panel = ControlPanel::new(Arc::clone(&session));
    let mut ticker = interval(config.daemon.status_poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = signals::wait_for_shutdown();
    tokio::pin!(shutdown);

    let mut menu = panel::spawn_menu_reader()?;
    let mut menu_open = true;

    let labels: Vec<&str> = InputSource::ALL.iter().map(|source| source.label()).collect();
    info!(inputs = ?labels, "Daemon running, enter an input name or press Ctrl+C to stop");

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            line = menu.recv(), if menu_open => {
                let Some(line) = line else {
                    menu_open = false;
                    continue;
                };
                match MenuCommand::parse(&line) {
                    Some(Ok(MenuCommand::Select(source))) => {
                        if let Err(e) = panel.select(source) {
                            warn!(input = %source, error = %e, "Input switch failed");
                        }
                    }
                    Some(Ok(MenuCommand::Exit)) => break,
                    Some(Err(e)) => warn!(error = %e, "Unknown menu entry"),
                    None => {}
                }
            }
            _ = ticker.tick() => {
                panel.refresh();
                if runtime.is_finished() {
                    warn!("Display controller stopped unexpectedly");
                    break;
                }
            }
        }
    }

    info!("Shutting down...");
    runtime.shutdown();
    tokio::task::spawn_blocking(move || runtime.join())
        .await
        .context("Display controller thread panicked")?;

    info!("Daemon stopped");
    Ok(())
}
