//! Monitor input sources and their switch commands.
//!
//! The monitor firmware accepts an ASCII command in an output report with
//! report ID `0x01`: `5b0050000` followed by a one-digit selector and a
//! carriage return, zero-padded to 53 bytes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Report ID carried by input-switch reports
pub const SWITCH_REPORT_ID: u8 = 0x01;
/// Total length of an input-switch report, including the report ID
pub const SWITCH_PAYLOAD_LEN: usize = 53;

/// Command prefix shared by all input selectors.
const SWITCH_COMMAND_PREFIX: &[u8] = b"5b0050000";
const COMMAND_TERMINATOR: u8 = b'\r';

/// A video input on the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    Hdmi1,
    Hdmi2,
    DisplayPort,
    UsbC,
}

impl InputSource {
    /// All inputs, in menu order.
    pub const ALL: [Self; 4] = [Self::DisplayPort, Self::Hdmi1, Self::Hdmi2, Self::UsbC];

    /// ASCII selector digit understood by the firmware.
    #[must_use]
    pub fn selector(self) -> u8 {
        match self {
            Self::Hdmi1 => b'0',
            Self::Hdmi2 => b'1',
            Self::DisplayPort => b'2',
            Self::UsbC => b'3',
        }
    }

    /// The ASCII command string, without report ID or terminator.
    #[must_use]
    pub fn command(self) -> String {
        let mut command = String::from_utf8_lossy(SWITCH_COMMAND_PREFIX).into_owned();
        command.push(char::from(self.selector()));
        command
    }

    /// Build the full output report that switches the monitor to this input.
    #[must_use]
    pub fn payload(self) -> [u8; SWITCH_PAYLOAD_LEN] {
        let mut report = [0u8; SWITCH_PAYLOAD_LEN];
        let prefix_end = 1 + SWITCH_COMMAND_PREFIX.len();

        report[0] = SWITCH_REPORT_ID;
        report[1..prefix_end].copy_from_slice(SWITCH_COMMAND_PREFIX);
        report[prefix_end] = self.selector();
        report[prefix_end + 1] = COMMAND_TERMINATOR;
        report
    }

    /// Human-readable menu label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Hdmi1 => "HDMI 1",
            Self::Hdmi2 => "HDMI 2",
            Self::DisplayPort => "DisplayPort",
            Self::UsbC => "Type-C",
        }
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for InputSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hdmi1" | "hdmi-1" | "hdmi_1" | "hdmi 1" => Ok(Self::Hdmi1),
            "hdmi2" | "hdmi-2" | "hdmi_2" | "hdmi 2" => Ok(Self::Hdmi2),
            "display_port" | "displayport" | "dp" => Ok(Self::DisplayPort),
            "usb_c" | "usbc" | "usb-c" | "type_c" | "typec" | "type-c" => Ok(Self::UsbC),
            _ => Err(Error::UnknownInputSource(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const HDMI1_HEAD: [u8; 12] =
        [0x01, 0x35, 0x62, 0x30, 0x30, 0x35, 0x30, 0x30, 0x30, 0x30, 0x30, 0x0D];

    fn expected_payload(selector: u8) -> Vec<u8> {
        let mut bytes = HDMI1_HEAD.to_vec();
        bytes[10] = selector;
        bytes.extend(std::iter::repeat_n(0u8, 41));
        bytes
    }

    #[test]
    fn test_hdmi1_payload_is_byte_exact() {
        let payload = InputSource::Hdmi1.payload();

        assert_eq!(payload.len(), 53);
        assert_eq!(payload.to_vec(), expected_payload(0x30));
    }

    #[test]
    fn test_all_payloads_differ_only_in_selector() {
        assert_eq!(InputSource::Hdmi2.payload().to_vec(), expected_payload(0x31));
        assert_eq!(InputSource::DisplayPort.payload().to_vec(), expected_payload(0x32));
        assert_eq!(InputSource::UsbC.payload().to_vec(), expected_payload(0x33));
    }

    #[test]
    fn test_payload_padding_is_zero() {
        for source in InputSource::ALL {
            let payload = source.payload();
            assert!(payload[12..].iter().all(|&b| b == 0), "{source} has non-zero padding");
        }
    }

    #[test]
    fn test_command_strings() {
        assert_eq!(InputSource::Hdmi1.command(), "5b00500000");
        assert_eq!(InputSource::UsbC.command(), "5b00500003");
    }

    #[test]
    fn test_menu_order_and_labels() {
        let labels: Vec<_> = InputSource::ALL.iter().map(|s| s.label()).collect();
        assert_eq!(labels, ["DisplayPort", "HDMI 1", "HDMI 2", "Type-C"]);
    }

    #[test]
    fn test_parse_names_and_aliases() {
        assert_eq!("hdmi1".parse::<InputSource>().unwrap(), InputSource::Hdmi1);
        assert_eq!("HDMI-2".parse::<InputSource>().unwrap(), InputSource::Hdmi2);
        assert_eq!("dp".parse::<InputSource>().unwrap(), InputSource::DisplayPort);
        assert_eq!("Type-C".parse::<InputSource>().unwrap(), InputSource::UsbC);
    }

    #[test]
    fn test_labels_parse_back() {
        for source in InputSource::ALL {
            assert_eq!(source.label().parse::<InputSource>().unwrap(), source);
        }
    }

    #[test]
    fn test_parse_unknown_input() {
        assert_matches!(
            "vga".parse::<InputSource>(),
            Err(Error::UnknownInputSource(name)) if name == "vga"
        );
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&InputSource::DisplayPort).unwrap();
        assert_eq!(json, "\"display_port\"");

        let source: InputSource = serde_json::from_str("\"usb_c\"").unwrap();
        assert_eq!(source, InputSource::UsbC);
    }
}
