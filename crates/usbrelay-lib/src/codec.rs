//! Feature report encoding and decoding.
//!
//! Pure functions over fixed 9-byte buffers. Channel validity is the caller's
//! job: [`Channel`](crate::relay::Channel) cannot hold an out-of-range value,
//! and the per-board bound is checked by the device before encoding.

use crate::protocol::{ProtocolConfig, REPORT_SIZE, ReportLayout, SERIAL_LEN};
use crate::relay::{Channel, RelayState, RelayStates, SerialNumber, Target};

/// One feature report buffer.
pub type Report = [u8; REPORT_SIZE];

/// Encoder/decoder for one board family on one platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    protocol: ProtocolConfig,
    layout: ReportLayout,
}

impl Default for Codec {
    fn default() -> Self {
        Codec::new(ProtocolConfig::default(), ReportLayout::default())
    }
}

impl Codec {
    pub const fn new(protocol: ProtocolConfig, layout: ReportLayout) -> Self {
        Codec { protocol, layout }
    }

    pub fn protocol(&self) -> &ProtocolConfig {
        &self.protocol
    }

    pub fn layout(&self) -> ReportLayout {
        self.layout
    }

    /// Buffer handed to `get_feature_report`: report ID in byte 0, rest zeroed.
    pub fn empty_report(&self) -> Report {
        let mut buf = [0u8; REPORT_SIZE];
        buf[0] = self.protocol.report_prefix;
        buf
    }

    /// Build a set-state command.
    ///
    /// `All` uses the dedicated all-channel opcodes and leaves byte 2 zero;
    /// a single channel carries its number in byte 2.
    pub fn encode_set_command(&self, state: RelayState, target: Target) -> Report {
        let mut buf = self.empty_report();
        match target {
            Target::All => {
                buf[1] = match state {
                    RelayState::On => self.protocol.all_on,
                    RelayState::Off => self.protocol.all_off,
                };
            }
            Target::Single(ch) => {
                buf[1] = match state {
                    RelayState::On => self.protocol.single_on,
                    RelayState::Off => self.protocol.single_off,
                };
                buf[2] = ch.get();
            }
        }
        buf
    }

    /// Build a set-serial command: opcode in byte 1, serial in bytes 2..7.
    pub fn encode_set_serial(&self, serial: &SerialNumber) -> Report {
        let mut buf = self.empty_report();
        buf[1] = self.protocol.set_serial;
        buf[2..2 + SERIAL_LEN].copy_from_slice(&serial.to_wire());
        buf
    }

    /// Read the byte at a canonical frame index, applying the platform layout.
    fn byte_at(&self, report: &Report, canonical: usize) -> u8 {
        self.layout
            .raw_index(canonical)
            .and_then(|i| report.get(i))
            .copied()
            .unwrap_or(0)
    }

    /// Per-channel states for channels `1..=relay_count` from a status read.
    pub fn decode_status(&self, report: &Report, relay_count: u8) -> RelayStates {
        let bits = self.byte_at(report, self.protocol.status_offset);
        Channel::up_to(relay_count)
            .map(|ch| (ch, RelayState::from_bit(bits & (1 << ch.bit()) != 0)))
            .collect()
    }

    /// The serial number stored on the board, from a status read.
    pub fn decode_serial(&self, report: &Report) -> SerialNumber {
        let mut raw = [0u8; SERIAL_LEN];
        for (i, b) in raw.iter_mut().enumerate() {
            *b = self.byte_at(report, self.protocol.serial_offset + i);
        }
        SerialNumber::from_wire(&raw)
    }
}
