//! usbrelay: control for dcttech-style USB HID relay boards.

pub mod codec;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod hid;
pub mod protocol;
pub mod relay;

pub use error::RelayError;
