//! One relay board: connection lifecycle, state cache, write-then-verify.
//!
//! A [`RelayDevice`] owns at most one open [`HidConnection`]. Every public
//! method takes the instance lock for its full duration, so a state change and
//! the status read that verifies it can never interleave with another call on
//! the same handle.

use std::ffi::{CStr, CString};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::codec::{Codec, Report};
use crate::error::{RelayError, Result};
use crate::hid::{DeviceDescriptor, HidBackend, HidConnection, HidError};
use crate::protocol::SERIAL_LEN;
use crate::relay::{Channel, RelayState, RelayStates, SerialNumber, Target};

/// When a set command may be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SetPolicy {
    /// Send and verify every command.
    #[default]
    Always,
    /// Skip the write when the cache came from a verified read in this open
    /// session and already matches the target for every affected channel.
    SkipUnchanged,
}

impl fmt::Display for SetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetPolicy::Always => write!(f, "always"),
            SetPolicy::SkipUnchanged => write!(f, "skip-unchanged"),
        }
    }
}

/// Snapshot of a device's identity, for listings and JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    pub serial: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub relay_count: u8,
    pub path: String,
}

struct Inner {
    connection: Option<Box<dyn HidConnection>>,
    serial: Option<SerialNumber>,
    states: RelayStates,
    /// Cache was filled by a verified read during the current open session.
    fresh: bool,
}

pub struct RelayDevice {
    backend: Arc<dyn HidBackend>,
    vendor_id: u16,
    product_id: u16,
    product_name: String,
    path: CString,
    relay_count: u8,
    codec: Codec,
    policy: SetPolicy,
    inner: Mutex<Inner>,
}

impl RelayDevice {
    /// A closed handle for the board at `descriptor.path`.
    ///
    /// `relay_count` is trusted; discovery derives it from the product string.
    pub fn new(
        backend: Arc<dyn HidBackend>,
        descriptor: &DeviceDescriptor,
        relay_count: u8,
        codec: Codec,
    ) -> Self {
        RelayDevice {
            backend,
            vendor_id: descriptor.vendor_id,
            product_id: descriptor.product_id,
            product_name: descriptor.product_name.clone().unwrap_or_default(),
            path: descriptor.path.clone(),
            relay_count,
            codec,
            policy: SetPolicy::default(),
            inner: Mutex::new(Inner {
                connection: None,
                serial: None,
                states: RelayStates::all_off(relay_count),
                fresh: false,
            }),
        }
    }

    pub fn with_set_policy(mut self, policy: SetPolicy) -> Self {
        self.policy = policy;
        self
    }

    // ── Lifecycle ──

    /// Open the HID connection. With `verify`, read the board status and
    /// populate the state cache.
    ///
    /// Opening an already-open device only performs the optional read.
    pub fn open(&self, verify: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.connection.is_none() {
            let connection = self.backend.open(&self.path)?;
            log::debug!("{}: opened", self.path_display());
            inner.connection = Some(connection);
            inner.fresh = false;
        }
        if verify {
            self.refresh(&mut inner)?;
        }
        Ok(())
    }

    /// Release the HID connection. The cached serial and states stay readable.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.fresh = false;
        if let Some(connection) = inner.connection.take() {
            connection.close()?;
            log::debug!("{}: closed", self.path_display());
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().connection.is_some()
    }

    // ── Relay control ──

    pub fn on(&self, target: Target) -> Result<()> {
        let mut inner = self.inner.lock();
        self.set(&mut inner, RelayState::On, target)
    }

    pub fn off(&self, target: Target) -> Result<()> {
        let mut inner = self.inner.lock();
        self.set(&mut inner, RelayState::Off, target)
    }

    /// Flip one channel, or every channel in ascending order.
    ///
    /// The opposite state is taken from the cache. For `All` each channel goes
    /// through its own write-then-verify; the first failure is returned and the
    /// remaining channels are left untouched.
    pub fn toggle(&self, target: Target) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::connection(&mut inner)?;
        let channels = match target {
            Target::Single(ch) => {
                self.check_channel(ch)?;
                vec![ch]
            }
            Target::All => Channel::up_to(self.relay_count).collect(),
        };
        for ch in channels {
            let next = inner.states.get(ch).unwrap_or_default().toggled();
            self.set(&mut inner, next, Target::Single(ch))?;
        }
        Ok(())
    }

    /// Read the board status, refresh the cache, and return it.
    pub fn states(&self) -> Result<RelayStates> {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner)
    }

    /// The last known states, without touching the board.
    pub fn cached_states(&self) -> RelayStates {
        self.inner.lock().states.clone()
    }

    // ── Serial number ──

    /// Write a new serial to the board. The cache is updated only after the
    /// write succeeds.
    ///
    /// Fails with [`RelayError::InvalidSerialNumber`] without touching the
    /// board unless `serial` is 1-5 printable ASCII characters.
    pub fn set_serial_number(&self, serial: &SerialNumber) -> Result<()> {
        let serial = &SerialNumber::new(serial.as_str())?;
        let mut inner = self.inner.lock();
        let report = self.codec.encode_set_serial(serial);
        self.write_report(&mut inner, &report)?;
        log::info!("{}: serial number set to {serial}", self.path_display());
        inner.serial = Some(serial.clone());
        Ok(())
    }

    /// The board's serial. Read once, then served from the cache for the
    /// lifetime of the handle (open or not).
    pub fn serial_number(&self) -> Result<SerialNumber> {
        let mut inner = self.inner.lock();
        if let Some(serial) = &inner.serial {
            return Ok(serial.clone());
        }
        let report = self.read_report(&mut inner)?;
        let serial = self.codec.decode_serial(&report);
        inner.serial = Some(serial.clone());
        Ok(serial)
    }

    // ── Accessors ──

    pub fn relay_count(&self) -> u8 {
        self.relay_count
    }

    pub fn path(&self) -> &CStr {
        &self.path
    }

    pub fn set_policy(&self) -> SetPolicy {
        self.policy
    }

    pub fn info(&self) -> DeviceSummary {
        DeviceSummary {
            serial: self.cached_serial(),
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            relay_count: self.relay_count,
            path: self.path_display(),
        }
    }

    // ── Internals ──

    fn cached_serial(&self) -> String {
        self.inner
            .lock()
            .serial
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    fn path_display(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    fn connection(inner: &mut Inner) -> Result<&mut Box<dyn HidConnection>> {
        inner
            .connection
            .as_mut()
            .ok_or(RelayError::DeviceNotConnected)
    }

    fn check_channel(&self, ch: Channel) -> Result<()> {
        if ch.get() > self.relay_count {
            return Err(RelayError::InvalidRelayNumber {
                channel: ch.to_string(),
                max: self.relay_count,
            });
        }
        Ok(())
    }

    fn affected(&self, target: Target) -> Vec<Channel> {
        match target {
            Target::Single(ch) => vec![ch],
            Target::All => Channel::up_to(self.relay_count).collect(),
        }
    }

    /// Send a set command, then read the status back and compare every
    /// affected channel against `state`. Caller holds the lock.
    fn set(&self, inner: &mut Inner, state: RelayState, target: Target) -> Result<()> {
        Self::connection(inner)?;
        if let Target::Single(ch) = target {
            self.check_channel(ch)?;
        }
        let channels = self.affected(target);

        if self.policy == SetPolicy::SkipUnchanged
            && inner.fresh
            && channels.iter().all(|&ch| inner.states.get(ch) == Some(state))
        {
            log::debug!(
                "{}: relay {target} already {state}, skipping write",
                self.path_display()
            );
            return Ok(());
        }

        let report = self.codec.encode_set_command(state, target);
        self.write_report(inner, &report)?;
        inner.fresh = false;

        let observed = self.refresh(inner)?;
        if let Some(&ch) = channels.iter().find(|&&ch| observed.get(ch) != Some(state)) {
            log::warn!(
                "{}: relay {ch} did not reach {state} after write",
                self.path_display()
            );
            return Err(RelayError::RelayStateNotSet { channel: ch, state });
        }
        log::info!("{}: relay {target} {state}", self.path_display());
        Ok(())
    }

    /// Status read into the cache. Also fills the serial on first sight.
    fn refresh(&self, inner: &mut Inner) -> Result<RelayStates> {
        let report = self.read_report(inner)?;
        let states = self.codec.decode_status(&report, self.relay_count);
        if inner.serial.is_none() {
            inner.serial = Some(self.codec.decode_serial(&report));
        }
        inner.states = states.clone();
        inner.fresh = true;
        Ok(states)
    }

    fn read_report(&self, inner: &mut Inner) -> Result<Report> {
        let mut report = self.codec.empty_report();
        let got = Self::connection(inner)?.get_feature_report(&mut report)?;
        log::debug!("{}: read {got} bytes {report:02x?}", self.path_display());
        let protocol = self.codec.protocol();
        let last = protocol
            .status_offset
            .max(protocol.serial_offset + SERIAL_LEN - 1);
        let expected = self.codec.layout().raw_index(last).map_or(0, |i| i + 1);
        if got < expected {
            return Err(HidError::ShortRead { expected, got }.into());
        }
        Ok(report)
    }

    fn write_report(&self, inner: &mut Inner, report: &Report) -> Result<()> {
        let connection = Self::connection(inner)?;
        log::debug!("{}: write {report:02x?}", self.path_display());
        connection.send_feature_report(report)?;
        Ok(())
    }
}

impl Drop for RelayDevice {
    fn drop(&mut self) {
        if let Some(connection) = self.inner.get_mut().connection.take() {
            if let Err(e) = connection.close() {
                log::warn!("{}: close on drop failed: {e}", self.path_display());
            }
        }
    }
}

impl fmt::Display for RelayDevice {
    /// `<serial>:<relay_count>:<vendor_id>:<product_id>`, IDs in decimal.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.cached_serial(),
            self.relay_count,
            self.vendor_id,
            self.product_id
        )
    }
}

impl fmt::Debug for RelayDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayDevice")
            .field("path", &self.path)
            .field("product_name", &self.product_name)
            .field("relay_count", &self.relay_count)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
