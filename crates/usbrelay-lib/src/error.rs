//! Unified error type for the usbrelay-lib crate.
//!
//! [`RelayError`] carries the relay-level failure kinds (discovery, validation,
//! write verification) and wraps transport errors from [`crate::hid`].
//! `From` impls allow `?` to propagate across module boundaries.

use std::fmt;

use crate::hid::HidError;
use crate::relay::{Channel, RelayState};

/// Unified error type for usbrelay-lib operations.
#[derive(Debug)]
pub enum RelayError {
    /// Enumeration or lookup found no matching board.
    NoDeviceFound,
    /// The device has not been opened, or has been closed.
    DeviceNotConnected,
    /// Channel outside `1..=max` and not `all`.
    InvalidRelayNumber { channel: String, max: u8 },
    /// Serial number too long, empty, or not printable ASCII.
    InvalidSerialNumber(String),
    /// A board's product string advertises an unsupported channel count.
    InvalidNumberOfRelays { product: String, max: u8 },
    /// The command was sent but the verification read disagrees.
    RelayStateNotSet { channel: Channel, state: RelayState },
    /// HID transport error (enumerate, open, feature report I/O).
    Hid(HidError),
    /// Standard I/O error (config persistence).
    Io(std::io::Error),
    /// Configuration validation error.
    Config(String),
}

impl RelayError {
    /// True for the "nothing attached" outcome of enumeration and lookup.
    pub fn is_no_device(&self) -> bool {
        matches!(self, RelayError::NoDeviceFound)
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::NoDeviceFound => write!(f, "no relay device found"),
            RelayError::DeviceNotConnected => {
                write!(f, "device is not connected, open it first")
            }
            RelayError::InvalidRelayNumber { channel, max } => {
                write!(
                    f,
                    "invalid relay number '{channel}': must be 1-{max} or \"all\""
                )
            }
            RelayError::InvalidSerialNumber(e) => write!(f, "invalid serial number: {e}"),
            RelayError::InvalidNumberOfRelays { product, max } => {
                write!(
                    f,
                    "invalid number of relays in product name '{product}' (supported: 1-{max})"
                )
            }
            RelayError::RelayStateNotSet { channel, state } => {
                write!(f, "relay {channel} could not be set to {state}")
            }
            RelayError::Hid(e) => write!(f, "{e}"),
            RelayError::Io(e) => write!(f, "I/O error: {e}"),
            RelayError::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelayError::Hid(e) => Some(e),
            RelayError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HidError> for RelayError {
    fn from(e: HidError) -> Self {
        RelayError::Hid(e)
    }
}

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        RelayError::Io(e)
    }
}

/// Crate-level Result alias using [`RelayError`].
pub type Result<T> = std::result::Result<T, RelayError>;
