//! Relay value types: channels, targets, states and serial numbers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{RelayError, Result};
use crate::protocol::{MAX_SUPPORTED_RELAYS, SERIAL_LEN};

// ── Channel ──

/// A 1-based relay channel number.
///
/// Construction only checks the wire-format ceiling
/// ([`MAX_SUPPORTED_RELAYS`]); the per-board bound is checked by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Channel(u8);

impl Channel {
    pub const fn new(number: u8) -> Option<Channel> {
        if number >= 1 && number <= MAX_SUPPORTED_RELAYS {
            Some(Channel(number))
        } else {
            None
        }
    }

    /// The 1-based channel number, as sent on the wire.
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Bit position in the status byte (channel 1 = bit 0).
    pub const fn bit(self) -> u8 {
        self.0 - 1
    }

    /// Channels `1..=count` in ascending order. Counts above the ceiling are clamped.
    pub fn up_to(count: u8) -> impl Iterator<Item = Channel> {
        (1..=count.min(MAX_SUPPORTED_RELAYS)).map(Channel)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Target ──

/// What a state change addresses: one channel, or every channel at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Single(Channel),
    All,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Single(ch) => write!(f, "{ch}"),
            Target::All => write!(f, "all"),
        }
    }
}

impl From<Channel> for Target {
    fn from(ch: Channel) -> Self {
        Target::Single(ch)
    }
}

impl FromStr for Target {
    type Err = RelayError;

    /// `"all"` (any case) or a decimal channel number.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Target::All);
        }
        s.parse::<u8>()
            .ok()
            .and_then(Channel::new)
            .map(Target::Single)
            .ok_or_else(|| RelayError::InvalidRelayNumber {
                channel: s.to_string(),
                max: MAX_SUPPORTED_RELAYS,
            })
    }
}

// ── RelayState ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelayState {
    On,
    #[default]
    Off,
}

impl RelayState {
    pub fn toggled(self) -> Self {
        match self {
            RelayState::On => RelayState::Off,
            RelayState::Off => RelayState::On,
        }
    }

    pub fn from_bit(set: bool) -> Self {
        if set { RelayState::On } else { RelayState::Off }
    }

    pub fn is_on(self) -> bool {
        self == RelayState::On
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayState::On => write!(f, "ON"),
            RelayState::Off => write!(f, "OFF"),
        }
    }
}

// ── RelayStates ──

/// Per-channel state mapping, ordered by channel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct RelayStates(BTreeMap<Channel, RelayState>);

impl RelayStates {
    /// Every channel `1..=count` set to OFF (the "not yet observed" default).
    pub fn all_off(count: u8) -> Self {
        RelayStates(Channel::up_to(count).map(|ch| (ch, RelayState::Off)).collect())
    }

    pub fn get(&self, channel: Channel) -> Option<RelayState> {
        self.0.get(&channel).copied()
    }

    pub fn set(&mut self, channel: Channel, state: RelayState) {
        self.0.insert(channel, state);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, RelayState)> + '_ {
        self.0.iter().map(|(&ch, &st)| (ch, st))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Channel, RelayState)> for RelayStates {
    fn from_iter<I: IntoIterator<Item = (Channel, RelayState)>>(iter: I) -> Self {
        RelayStates(iter.into_iter().collect())
    }
}

// ── SerialNumber ──

/// The identifier persisted on the board (at most 5 ASCII characters).
///
/// Equality is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SerialNumber(String);

impl SerialNumber {
    /// Validate a serial number supplied by a caller.
    ///
    /// Accepts 1–5 printable ASCII characters excluding space (`0x21..=0x7E`).
    pub fn new(value: &str) -> Result<Self> {
        if value.is_empty() {
            return Err(RelayError::InvalidSerialNumber(
                "serial number cannot be empty".into(),
            ));
        }
        if value.len() > SERIAL_LEN {
            return Err(RelayError::InvalidSerialNumber(format!(
                "'{value}' is longer than {SERIAL_LEN} characters"
            )));
        }
        if let Some(bad) = value.chars().find(|c| !c.is_ascii_graphic()) {
            return Err(RelayError::InvalidSerialNumber(format!(
                "'{value}' contains unsupported character {bad:?} (printable ASCII only)"
            )));
        }
        Ok(SerialNumber(value.to_string()))
    }

    /// Build the cached value from the raw bytes read off a board.
    ///
    /// Trailing NUL and space padding is dropped; every remaining byte maps to
    /// exactly one character so the value round-trips through [`to_wire`](Self::to_wire).
    /// Not validated: a blank or garbled board yields a value [`new`](Self::new) rejects.
    pub(crate) fn from_wire(raw: &[u8; SERIAL_LEN]) -> Self {
        let end = raw
            .iter()
            .rposition(|&b| b != 0 && b != b' ')
            .map_or(0, |i| i + 1);
        SerialNumber(raw[..end].iter().map(|&b| char::from(b)).collect())
    }

    /// The 5 bytes written to the board, zero-filled on the right.
    pub fn to_wire(&self) -> [u8; SERIAL_LEN] {
        let mut out = [0u8; SERIAL_LEN];
        for (dst, c) in out.iter_mut().zip(self.0.chars()) {
            *dst = u32::from(c).try_into().unwrap_or(b'?');
        }
        out
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SerialNumber {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        SerialNumber::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Channel ──

    #[test]
    fn channel_rejects_zero_and_above_ceiling() {
        assert!(Channel::new(0).is_none());
        assert!(Channel::new(MAX_SUPPORTED_RELAYS + 1).is_none());
        assert_eq!(Channel::new(1).unwrap().get(), 1);
        assert_eq!(Channel::new(8).unwrap().bit(), 7);
    }

    #[test]
    fn channel_up_to_is_ascending() {
        let chans: Vec<u8> = Channel::up_to(4).map(Channel::get).collect();
        assert_eq!(chans, vec![1, 2, 3, 4]);
    }

    #[test]
    fn channel_up_to_zero_is_empty() {
        assert_eq!(Channel::up_to(0).count(), 0);
    }

    #[test]
    fn channel_up_to_clamps_to_ceiling() {
        assert_eq!(Channel::up_to(200).count(), MAX_SUPPORTED_RELAYS as usize);
    }

    // ── Target ──

    #[test]
    fn target_parses_all_case_insensitive() {
        assert_eq!("all".parse::<Target>().unwrap(), Target::All);
        assert_eq!("ALL".parse::<Target>().unwrap(), Target::All);
        assert_eq!(" All ".parse::<Target>().unwrap(), Target::All);
    }

    #[test]
    fn target_parses_channel_number() {
        let t: Target = "3".parse().unwrap();
        assert_eq!(t, Target::Single(Channel::new(3).unwrap()));
    }

    #[test]
    fn target_rejects_zero() {
        let err = "0".parse::<Target>().unwrap_err();
        assert!(matches!(err, RelayError::InvalidRelayNumber { ref channel, .. } if channel == "0"));
    }

    #[test]
    fn target_rejects_garbage() {
        assert!("relay".parse::<Target>().is_err());
        assert!("-1".parse::<Target>().is_err());
        assert!("".parse::<Target>().is_err());
    }

    #[test]
    fn target_display() {
        assert_eq!(Target::All.to_string(), "all");
        assert_eq!(Target::Single(Channel::new(2).unwrap()).to_string(), "2");
    }

    // ── RelayState ──

    #[test]
    fn toggled_is_involution() {
        for s in [RelayState::On, RelayState::Off] {
            assert_eq!(s.toggled().toggled(), s);
            assert_ne!(s.toggled(), s);
        }
    }

    #[test]
    fn state_default_is_off() {
        assert_eq!(RelayState::default(), RelayState::Off);
    }

    #[test]
    fn state_display() {
        assert_eq!(RelayState::On.to_string(), "ON");
        assert_eq!(RelayState::Off.to_string(), "OFF");
    }

    // ── RelayStates ──

    #[test]
    fn all_off_covers_every_channel() {
        let states = RelayStates::all_off(4);
        assert_eq!(states.len(), 4);
        assert!(states.iter().all(|(_, s)| s == RelayState::Off));
        assert_eq!(states.get(Channel::new(5).unwrap()), None);
    }

    #[test]
    fn relay_states_serialize_as_map() {
        let mut states = RelayStates::all_off(2);
        states.set(Channel::new(2).unwrap(), RelayState::On);
        let json = serde_json::to_string(&states).unwrap();
        assert_eq!(json, r#"{"1":"OFF","2":"ON"}"#);
    }

    // ── SerialNumber ──

    #[test]
    fn serial_accepts_up_to_five_ascii() {
        assert_eq!(SerialNumber::new("ABCDE").unwrap().as_str(), "ABCDE");
        assert_eq!(SerialNumber::new("a1").unwrap().as_str(), "a1");
    }

    #[test]
    fn serial_rejects_too_long() {
        let err = SerialNumber::new("ABCDEF").unwrap_err();
        assert!(matches!(err, RelayError::InvalidSerialNumber(_)));
    }

    #[test]
    fn serial_rejects_empty() {
        assert!(SerialNumber::new("").is_err());
    }

    #[test]
    fn serial_rejects_non_ascii() {
        // 'é' is 2 bytes, so this stays within the length limit
        assert!(SerialNumber::new("AB\u{e9}").is_err());
    }

    #[test]
    fn serial_rejects_space_and_control() {
        assert!(SerialNumber::new("A B").is_err());
        assert!(SerialNumber::new("A\tB").is_err());
    }

    #[test]
    fn serial_is_case_sensitive() {
        assert_ne!(
            SerialNumber::new("abcde").unwrap(),
            SerialNumber::new("ABCDE").unwrap()
        );
    }

    #[test]
    fn from_wire_strips_padding() {
        assert_eq!(SerialNumber::from_wire(b"AB\0\0\0").as_str(), "AB");
        assert_eq!(SerialNumber::from_wire(b"AB   ").as_str(), "AB");
        assert_eq!(SerialNumber::from_wire(b"ABCDE").as_str(), "ABCDE");
        assert_eq!(SerialNumber::from_wire(&[0; 5]).as_str(), "");
    }

    #[test]
    fn to_wire_zero_fills() {
        let sn = SerialNumber::new("XY").unwrap();
        assert_eq!(&sn.to_wire(), b"XY\0\0\0");
    }

    #[test]
    fn wire_bytes_round_trip_including_high_bytes() {
        let raw = [0x41, 0xFF, 0x80, 0x42, 0x00];
        assert_eq!(SerialNumber::from_wire(&raw).to_wire(), raw);
    }
}
