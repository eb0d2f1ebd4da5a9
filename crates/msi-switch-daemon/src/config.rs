//! Daemon configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use directories::ProjectDirs;
use msi_switch_core::{DeviceFilter, MONITOR_PRODUCT_ID, MSI_VENDOR_ID, REPORT_SIZE};
use msi_switch_hid::{SessionOptions, WatchMode};
use serde::{Deserialize, Serialize};

/// Shortest wait the session and reader threads are configured with.
pub const MIN_WAIT_MS: u64 = 10;

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Device settings
    #[serde(default)]
    pub device: DeviceConfig,
}

/// Daemon-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// How often the controls refresh the connection flag
    #[serde(default = "default_status_poll_ms")]
    pub status_poll_interval_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self { log_level: default_log_level(), status_poll_interval_ms: default_status_poll_ms() }
    }
}

impl DaemonConfig {
    #[must_use]
    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms.max(1))
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_status_poll_ms() -> u64 {
    1000
}

/// Device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// USB Vendor ID (hex)
    #[serde(default = "default_vid")]
    pub vendor_id: String,
    /// USB Product ID (hex)
    #[serde(default = "default_pid")]
    pub product_id: String,
    /// Declared HID report size
    #[serde(default = "default_report_size")]
    pub report_size: usize,
    /// Device notification source
    #[serde(default)]
    pub watch_mode: WatchMode,
    /// Enumeration interval in polling mode
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Notification wait before checking for shutdown
    #[serde(default = "default_event_timeout_ms")]
    pub event_timeout_ms: u64,
    /// Input report read timeout
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Attempts to open a matched device
    #[serde(default = "default_open_retries")]
    pub open_retries: u32,
    /// Log unsolicited input reports
    #[serde(default = "default_true")]
    pub listen_input: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: default_vid(),
            product_id: default_pid(),
            report_size: default_report_size(),
            watch_mode: WatchMode::default(),
            poll_interval_ms: default_poll_interval_ms(),
            event_timeout_ms: default_event_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            open_retries: default_open_retries(),
            listen_input: true,
        }
    }
}

impl DeviceConfig {
    /// Parse the configured vendor/product pair.
    ///
    /// # Errors
    /// Returns an error if either ID is not a 16-bit hex number.
    pub fn filter(&self) -> Result<DeviceFilter> {
        Ok(DeviceFilter::new(
            parse_usb_id(&self.vendor_id).context("Invalid device.vendor_id")?,
            parse_usb_id(&self.product_id).context("Invalid device.product_id")?,
        ))
    }

    /// The declared report size.
    ///
    /// # Errors
    /// Returns an error if the size is zero or larger than the interface's
    /// 64-byte report.
    pub fn report_size(&self) -> Result<usize> {
        ensure!(
            (1..=REPORT_SIZE).contains(&self.report_size),
            "Invalid device.report_size {}: must be between 1 and {REPORT_SIZE}",
            self.report_size
        );
        Ok(self.report_size)
    }

    /// Session loop options derived from these settings.
    ///
    /// Waits are floored at [`MIN_WAIT_MS`] so a zero never turns the
    /// session or reader thread into a busy loop.
    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            mode: self.watch_mode,
            event_timeout: Duration::from_millis(self.event_timeout_ms.max(MIN_WAIT_MS)),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(MIN_WAIT_MS)),
            read_timeout: Duration::from_millis(self.read_timeout_ms.max(MIN_WAIT_MS)),
            open_retries: self.open_retries.max(1),
            listen_input: self.listen_input,
        }
    }
}

fn default_vid() -> String {
    format!("{MSI_VENDOR_ID:04x}")
}

fn default_pid() -> String {
    format!("{MONITOR_PRODUCT_ID:04x}")
}

fn default_report_size() -> usize {
    REPORT_SIZE
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_event_timeout_ms() -> u64 {
    250
}

fn default_read_timeout_ms() -> u64 {
    100
}

fn default_open_retries() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

/// Parse a USB ID written as hex, with or without a `0x` prefix.
fn parse_usb_id(value: &str) -> Result<u16> {
    let digits = value.trim().trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).with_context(|| format!("{value:?} is not a 16-bit hex ID"))
}

/// Load configuration from the default location, or defaults.
///
/// Returns the path that was consulted alongside the configuration.
pub fn load_config() -> Result<(Config, PathBuf)> {
    let path = config_path()?;
    let config = load_config_from(&path)?;
    Ok((config, path))
}

/// Load configuration from `path`. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {path:?}"))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {path:?}"))?;
    Ok(config)
}

/// Get the configuration file path.
fn config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("com", "msi-switch", "MSI Display Switch")
        .context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes()).expect("Failed to write config");
        file
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = load_config_from(&dir.path().join("config.toml")).unwrap();

        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.daemon.status_poll_interval(), Duration::from_secs(1));
        assert_eq!(config.device.filter().unwrap(), DeviceFilter::default());
        assert_eq!(config.device.report_size, 64);
        assert_eq!(config.device.watch_mode, WatchMode::Auto);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let file = write_config(
            r#"
            [daemon]
            log_level = "debug"

            [device]
            watch_mode = "polling"
            poll_interval_ms = 500
            "#,
        );
        let config = load_config_from(file.path()).unwrap();

        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.daemon.status_poll_interval_ms, 1000);
        assert_eq!(config.device.watch_mode, WatchMode::Polling);

        let options = config.device.session_options();
        assert_eq!(options.mode, WatchMode::Polling);
        assert_eq!(options.poll_interval, Duration::from_millis(500));
        assert_eq!(options.open_retries, 5);
        assert!(options.listen_input);
    }

    #[test]
    fn test_custom_device_ids() {
        let file = write_config(
            r#"
            [device]
            vendor_id = "0x0fd9"
            product_id = "0070"
            "#,
        );
        let config = load_config_from(file.path()).unwrap();

        assert_eq!(config.device.filter().unwrap(), DeviceFilter::new(0x0fd9, 0x0070));
    }

    #[test]
    fn test_invalid_device_id_rejected() {
        let device = DeviceConfig { vendor_id: "msi".to_string(), ..DeviceConfig::default() };
        assert!(device.filter().is_err());

        let device = DeviceConfig { product_id: "12345".to_string(), ..DeviceConfig::default() };
        assert!(device.filter().is_err());
    }

    #[test]
    fn test_unknown_watch_mode_fails_to_parse() {
        let file = write_config("[device]\nwatch_mode = \"udev\"\n");
        assert!(load_config_from(file.path()).is_err());
    }

    #[test]
    fn test_zero_waits_clamped() {
        let file = write_config(
            "[device]\nevent_timeout_ms = 0\nread_timeout_ms = 0\npoll_interval_ms = 0\n",
        );
        let options = load_config_from(file.path()).unwrap().device.session_options();

        let floor = Duration::from_millis(MIN_WAIT_MS);
        assert_eq!(options.event_timeout, floor);
        assert_eq!(options.read_timeout, floor);
        assert_eq!(options.poll_interval, floor);
    }

    #[test]
    fn test_report_size_bounds() {
        assert_eq!(DeviceConfig::default().report_size().unwrap(), 64);

        let device = DeviceConfig { report_size: 32, ..DeviceConfig::default() };
        assert_eq!(device.report_size().unwrap(), 32);

        let device = DeviceConfig { report_size: 0, ..DeviceConfig::default() };
        assert!(device.report_size().is_err());

        let device = DeviceConfig { report_size: 65, ..DeviceConfig::default() };
        assert!(device.report_size().is_err());
    }

    #[test]
    fn test_zero_retries_clamped() {
        let device = DeviceConfig { open_retries: 0, ..DeviceConfig::default() };
        assert_eq!(device.session_options().open_retries, 1);
    }
}
