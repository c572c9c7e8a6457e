//! Protocol constants for dcttech-style USB HID relay boards.
//!
//! All boards in this family share the V-USB shared VID/PID pair and are told
//! apart by their HID product string (`USBRelay1` … `USBRelay8`). Commands and
//! status both travel through a single 9-byte feature report.
//!
//! ## Canonical feature report frame
//!
//! ```text
//! byte 0      report ID (always 0x00)
//! byte 1      opcode (writes) / serial[0] (reads)
//! byte 2      channel number (single-channel writes) / serial[1] (reads)
//! bytes 1..6  serial number (reads, 5 bytes)
//! byte 8      relay status bitmask, bit 0 = channel 1 (reads)
//! ```
//!
//! A transport that drops the leading report-ID byte from feature-report reads
//! hands back the frame shifted left by one. [`ReportLayout`] names which
//! variant a transport returns.

// ── USB identity ──

/// Vendor ID (5824 = voti.nl, the V-USB shared VID).
pub const RELAY_VID: u16 = 0x16c0;

/// Product ID (obdev's shared PID for HID class devices).
pub const RELAY_PID: u16 = 0x05DF;

/// Product string prefix; the channel count is the decimal suffix.
pub const RELAY_NAME_PREFIX: &str = "USBRelay";

// ── Report geometry ──

/// Feature report length including the report-ID byte.
pub const REPORT_SIZE: usize = 9;

/// Length of the serial number stored on the board.
pub const SERIAL_LEN: usize = 5;

/// The status report has one bit per channel in a single byte.
pub const MAX_SUPPORTED_RELAYS: u8 = 8;

// ── Opcodes ──

/// Report ID / command prefix, byte 0 of every frame.
pub const REPORT_PREFIX: u8 = 0x00;

/// Switch one channel on. Byte 2 carries the channel number.
pub const CMD_SINGLE_ON: u8 = 0xFF;

/// Switch one channel off. Byte 2 carries the channel number.
pub const CMD_SINGLE_OFF: u8 = 0xFD;

/// Switch every channel on.
pub const CMD_ALL_ON: u8 = 0xFE;

/// Switch every channel off.
pub const CMD_ALL_OFF: u8 = 0xFC;

/// Write a new serial number into bytes 2..7.
pub const CMD_SET_SERIAL: u8 = 0xFA;

/// Canonical offset of the serial number in a status read.
pub const OFF_SERIAL: usize = 1;

/// Canonical offset of the status bitmask in a status read.
pub const OFF_STATUS: usize = 8;

/// Opcode set and field offsets for one board family.
///
/// [`Default`] is the dcttech board. A board with a different command set can
/// be driven by substituting another value into [`Codec`](crate::codec::Codec).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolConfig {
    pub report_prefix: u8,
    pub single_on: u8,
    pub single_off: u8,
    pub all_on: u8,
    pub all_off: u8,
    pub set_serial: u8,
    /// Canonical index of the first serial byte in a read.
    pub serial_offset: usize,
    /// Canonical index of the status byte in a read.
    pub status_offset: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            report_prefix: REPORT_PREFIX,
            single_on: CMD_SINGLE_ON,
            single_off: CMD_SINGLE_OFF,
            all_on: CMD_ALL_ON,
            all_off: CMD_ALL_OFF,
            set_serial: CMD_SET_SERIAL,
            serial_offset: OFF_SERIAL,
            status_offset: OFF_STATUS,
        }
    }
}

/// Whether feature-report reads carry the leading report-ID byte.
///
/// This is a property of the HID transport, not of the operating system:
/// hidapi puts the report ID back into byte 0 on every platform, including
/// macOS where IOKit itself returns the bare payload. See
/// [`HidBackend::report_layout`](crate::hid::HidBackend::report_layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportLayout {
    /// Byte 0 is the report ID; the buffer is the canonical frame.
    #[default]
    Prefixed,
    /// The payload starts at byte 0; canonical index `i` is raw index `i - 1`.
    Unprefixed,
}

impl ReportLayout {
    /// Raw buffer index of a canonical frame index, or `None` if the byte is
    /// not present in this layout (the report ID itself when unprefixed).
    pub const fn raw_index(self, canonical: usize) -> Option<usize> {
        match self {
            ReportLayout::Prefixed => Some(canonical),
            ReportLayout::Unprefixed => canonical.checked_sub(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_distinct() {
        let codes = [
            CMD_SINGLE_ON,
            CMD_SINGLE_OFF,
            CMD_ALL_ON,
            CMD_ALL_OFF,
            CMD_SET_SERIAL,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b, "opcode 0x{a:02X} appears twice");
            }
        }
    }

    #[test]
    fn opcodes_never_collide_with_channel_numbers() {
        let cfg = ProtocolConfig::default();
        for op in [cfg.single_on, cfg.single_off, cfg.all_on, cfg.all_off] {
            assert!(op > MAX_SUPPORTED_RELAYS);
        }
    }

    #[test]
    fn serial_and_status_fit_in_report() {
        assert!(OFF_SERIAL + SERIAL_LEN <= OFF_STATUS);
        assert!(OFF_STATUS < REPORT_SIZE);
    }

    #[test]
    fn default_protocol_matches_constants() {
        let cfg = ProtocolConfig::default();
        assert_eq!(cfg.report_prefix, 0x00);
        assert_eq!(cfg.set_serial, 0xFA);
        assert_eq!(cfg.status_offset, 8);
    }

    #[test]
    fn prefixed_layout_is_identity() {
        for i in 0..REPORT_SIZE {
            assert_eq!(ReportLayout::Prefixed.raw_index(i), Some(i));
        }
    }

    #[test]
    fn unprefixed_layout_shifts_left() {
        assert_eq!(ReportLayout::Unprefixed.raw_index(0), None);
        assert_eq!(ReportLayout::Unprefixed.raw_index(1), Some(0));
        assert_eq!(ReportLayout::Unprefixed.raw_index(OFF_STATUS), Some(7));
    }

    #[test]
    fn default_layout_is_prefixed_on_every_platform() {
        assert_eq!(ReportLayout::default(), ReportLayout::Prefixed);
    }
}
