//! Board discovery and lookup by serial number.
//!
//! Enumeration is all-or-nothing: a board with an unsupported product string
//! or one that fails its serial probe fails the whole call instead of being
//! left out of the list.

use std::sync::Arc;

use crate::codec::Codec;
use crate::config::{Config, LayoutSetting};
use crate::device::{RelayDevice, SetPolicy};
use crate::error::{RelayError, Result};
use crate::hid::{HidApiBackend, HidBackend};
use crate::protocol::{MAX_SUPPORTED_RELAYS, ProtocolConfig};

/// What to look for, and how to drive what is found.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    pub name_prefix: String,
    /// Largest channel count accepted from a product string.
    pub max_relays: u8,
    pub protocol: ProtocolConfig,
    /// `Auto` takes the layout from the backend.
    pub report_layout: LayoutSetting,
    pub set_policy: SetPolicy,
}

impl From<&Config> for DiscoveryConfig {
    fn from(config: &Config) -> Self {
        DiscoveryConfig {
            vendor_id: config.vendor_id,
            product_id: config.product_id,
            name_prefix: config.name_prefix.clone(),
            max_relays: config.max_relays.clamp(1, MAX_SUPPORTED_RELAYS),
            protocol: ProtocolConfig::default(),
            report_layout: config.report_layout,
            set_policy: config.set_policy,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig::from(&Config::default())
    }
}

/// Channel count encoded in a product string.
///
/// `None` if `product_name` does not start with `prefix`. Otherwise the rest
/// must be a decimal number in `1..=max`, or the result is
/// [`RelayError::InvalidNumberOfRelays`].
pub fn parse_relay_count(product_name: &str, prefix: &str, max: u8) -> Option<Result<u8>> {
    let suffix = product_name.strip_prefix(prefix)?;
    let count = if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        None
    } else {
        suffix.parse::<u8>().ok().filter(|n| (1..=max).contains(n))
    };
    Some(count.ok_or_else(|| RelayError::InvalidNumberOfRelays {
        product: product_name.to_string(),
        max,
    }))
}

pub struct Discovery {
    backend: Arc<dyn HidBackend>,
    config: DiscoveryConfig,
}

impl Discovery {
    pub fn new(backend: Arc<dyn HidBackend>, config: DiscoveryConfig) -> Self {
        Discovery { backend, config }
    }

    /// Discovery over the system HID stack.
    pub fn hidapi(config: &Config) -> Result<Self> {
        let backend = HidApiBackend::new()?;
        Ok(Discovery::new(Arc::new(backend), DiscoveryConfig::from(config)))
    }

    /// Codec for the configured protocol in the layout the backend reads in,
    /// unless the configuration pins one.
    pub fn codec(&self) -> Codec {
        let layout = self
            .config
            .report_layout
            .resolve(self.backend.report_layout());
        Codec::new(self.config.protocol, layout)
    }

    /// Every attached board, closed, with its serial number read.
    ///
    /// `Err(NoDeviceFound)` when the HID layer reports nothing with the
    /// configured VID/PID. Devices with that VID/PID whose product string does
    /// not carry the relay prefix are skipped, so the list may be empty.
    pub fn enumerate(&self) -> Result<Vec<RelayDevice>> {
        let cfg = &self.config;
        let descriptors = self.backend.enumerate(cfg.vendor_id, cfg.product_id)?;
        if descriptors.is_empty() {
            log::debug!(
                "no HID device with VID 0x{:04X} PID 0x{:04X}",
                cfg.vendor_id,
                cfg.product_id
            );
            return Err(RelayError::NoDeviceFound);
        }

        // Classify everything before opening anything.
        let mut candidates = Vec::with_capacity(descriptors.len());
        for desc in &descriptors {
            let name = desc.product_name.as_deref().unwrap_or_default();
            match parse_relay_count(name, &cfg.name_prefix, cfg.max_relays) {
                Some(count) => candidates.push((desc, count?)),
                None => log::debug!("skipping {} ({name:?})", desc.path_display()),
            }
        }

        let codec = self.codec();
        let mut devices = Vec::with_capacity(candidates.len());
        for (desc, count) in candidates {
            let device = RelayDevice::new(Arc::clone(&self.backend), desc, count, codec)
                .with_set_policy(cfg.set_policy);
            Self::probe(&device)?;
            devices.push(device);
        }
        log::debug!("found {} relay board(s)", devices.len());
        Ok(devices)
    }

    /// The board whose serial equals `serial` exactly (case-sensitive).
    ///
    /// Re-enumerates on every call; OS paths do not survive replugging.
    pub fn device_by_serial(&self, serial: &str) -> Result<RelayDevice> {
        self.enumerate()?
            .into_iter()
            .find(|d| d.info().serial == serial)
            .ok_or(RelayError::NoDeviceFound)
    }

    /// Open without verification, read the serial, close.
    fn probe(device: &RelayDevice) -> Result<()> {
        device.open(false)?;
        let serial = device.serial_number();
        let closed = device.close();
        let serial = serial?;
        closed?;
        log::debug!(
            "{}: serial {serial}, {} relays",
            device.path().to_string_lossy(),
            device.relay_count()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::HidError;
    use crate::hid::mock::{MockBackend, MockBoard};
    use crate::protocol::{RELAY_PID, RELAY_VID, ReportLayout};
    use crate::relay::{Channel, RelayState, Target};

    fn test_config() -> DiscoveryConfig {
        DiscoveryConfig {
            report_layout: LayoutSetting::Prefixed,
            ..DiscoveryConfig::default()
        }
    }

    fn discovery(backend: MockBackend) -> Discovery {
        Discovery::new(Arc::new(backend), test_config())
    }

    // ── parse_relay_count ──

    #[test]
    fn parse_valid_counts() {
        for n in 1..=8u8 {
            let name = format!("USBRelay{n}");
            assert_eq!(parse_relay_count(&name, "USBRelay", 8).unwrap().unwrap(), n);
        }
    }

    #[test]
    fn parse_other_prefix_is_none() {
        assert!(parse_relay_count("Keyboard", "USBRelay", 8).is_none());
        assert!(parse_relay_count("usbrelay4", "USBRelay", 8).is_none());
    }

    #[test]
    fn parse_bad_suffix_is_error() {
        for name in [
            "USBRelay",
            "USBRelay0",
            "USBRelay13",
            "USBRelayX",
            "USBRelay+4",
            "USBRelay 4",
        ] {
            let result = parse_relay_count(name, "USBRelay", 8);
            assert!(
                matches!(result, Some(Err(RelayError::InvalidNumberOfRelays { .. }))),
                "{name}"
            );
        }
    }

    #[test]
    fn parse_respects_max() {
        assert!(parse_relay_count("USBRelay8", "USBRelay", 4).unwrap().is_err());
        assert_eq!(parse_relay_count("USBRelay4", "USBRelay", 4).unwrap().unwrap(), 4);
    }

    // ── enumerate ──

    #[test]
    fn no_descriptors_is_no_device_found() {
        let d = discovery(MockBackend::new());
        assert!(d.enumerate().unwrap_err().is_no_device());
    }

    #[test]
    fn other_products_are_filtered_out() {
        let backend = MockBackend::new()
            .with_board("Keyboard", MockBoard::new(0, ""))
            .with_device(RELAY_VID, RELAY_PID, None, MockBoard::new(0, ""));
        let devices = discovery(backend).enumerate().unwrap();
        assert!(devices.is_empty());
    }

    #[test]
    fn out_of_range_count_fails_whole_enumeration() {
        let good = MockBoard::new(2, "GOOD1");
        let backend = MockBackend::new()
            .with_board("USBRelay2", good.clone())
            .with_board("USBRelay13", MockBoard::new(8, "BAD01"));
        let err = discovery(backend).enumerate().unwrap_err();
        assert!(matches!(
            err,
            RelayError::InvalidNumberOfRelays { ref product, max: 8 } if product == "USBRelay13"
        ));
        assert_eq!(good.opens(), 0);
    }

    #[test]
    fn devices_are_returned_closed_with_serial() {
        let a = MockBoard::new(2, "AAAAA");
        let b = MockBoard::new(8, "BBBBB");
        let backend = MockBackend::new()
            .with_board("USBRelay2", a.clone())
            .with_board("USBRelay8", b.clone());
        let devices = discovery(backend).enumerate().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].info().serial, "AAAAA");
        assert_eq!(devices[0].relay_count(), 2);
        assert_eq!(devices[1].info().serial, "BBBBB");
        assert_eq!(devices[1].relay_count(), 8);
        for (dev, board) in devices.iter().zip([&a, &b]) {
            assert!(!dev.is_open());
            assert!(!board.is_open());
            assert_eq!(board.opens(), 1);
            assert_eq!(board.closes(), 1);
            assert_eq!(board.writes(), 0);
        }
    }

    #[test]
    fn probe_failure_aborts_enumeration() {
        let a = MockBoard::new(2, "AAAAA");
        let b = MockBoard::new(2, "BBBBB");
        b.fail_read(true);
        let backend = MockBackend::new()
            .with_board("USBRelay2", a.clone())
            .with_board("USBRelay2", b.clone());
        let err = discovery(backend).enumerate().unwrap_err();
        assert!(matches!(err, RelayError::Hid(HidError::Read(_))));
        assert!(!a.is_open());
        assert!(!b.is_open(), "failed probe must still close");
    }

    #[test]
    fn open_failure_aborts_enumeration() {
        let a = MockBoard::new(2, "AAAAA");
        a.fail_open(true);
        let backend = MockBackend::new().with_board("USBRelay2", a);
        assert!(matches!(
            discovery(backend).enumerate(),
            Err(RelayError::Hid(HidError::Open(_)))
        ));
    }

    #[test]
    fn backend_enumerate_error_propagates() {
        let backend = MockBackend::new().failing_enumerate();
        assert!(matches!(
            discovery(backend).enumerate(),
            Err(RelayError::Hid(HidError::Enumerate(_)))
        ));
    }

    #[test]
    fn configured_max_relays_is_honoured() {
        let backend = MockBackend::new().with_board("USBRelay8", MockBoard::new(8, "AAAAA"));
        let config = DiscoveryConfig {
            max_relays: 4,
            ..test_config()
        };
        let err = Discovery::new(Arc::new(backend), config).enumerate().unwrap_err();
        assert!(matches!(err, RelayError::InvalidNumberOfRelays { max: 4, .. }));
    }

    #[test]
    fn devices_inherit_set_policy() {
        let backend = MockBackend::new().with_board("USBRelay1", MockBoard::new(1, "AAAAA"));
        let config = DiscoveryConfig {
            set_policy: SetPolicy::SkipUnchanged,
            ..test_config()
        };
        let devices = Discovery::new(Arc::new(backend), config).enumerate().unwrap();
        assert_eq!(devices[0].set_policy(), SetPolicy::SkipUnchanged);
    }

    #[test]
    fn config_conversion_clamps_max_relays() {
        let config = Config {
            max_relays: 40,
            ..Config::default()
        };
        assert_eq!(DiscoveryConfig::from(&config).max_relays, MAX_SUPPORTED_RELAYS);
    }

    #[test]
    fn auto_layout_follows_backend() {
        for layout in [ReportLayout::Prefixed, ReportLayout::Unprefixed] {
            let board = MockBoard::new(2, "ABCDE").with_layout(layout).with_status(0b10);
            let backend = MockBackend::new()
                .with_report_layout(layout)
                .with_board("USBRelay2", board.clone());
            let d = Discovery::new(Arc::new(backend), DiscoveryConfig::default());
            assert_eq!(d.codec().layout(), layout);

            let dev = d.device_by_serial("ABCDE").unwrap();
            dev.open(true).unwrap();
            let two = Channel::new(2).unwrap();
            assert_eq!(dev.cached_states().get(two), Some(RelayState::On));
            dev.on(Target::Single(Channel::new(1).unwrap())).unwrap();
            assert_eq!(board.status_bits(), 0b11, "{layout:?}");
        }
    }

    #[test]
    fn configured_layout_overrides_backend() {
        let board = MockBoard::new(2, "ABCDE").with_layout(ReportLayout::Unprefixed);
        let backend = MockBackend::new().with_board("USBRelay2", board);
        let config = DiscoveryConfig {
            report_layout: LayoutSetting::Unprefixed,
            ..DiscoveryConfig::default()
        };
        let d = Discovery::new(Arc::new(backend), config);
        assert_eq!(d.codec().layout(), ReportLayout::Unprefixed);
        assert_eq!(d.device_by_serial("ABCDE").unwrap().info().serial, "ABCDE");
    }

    #[test]
    fn hidapi_defaults_decode_prefixed() {
        let config = DiscoveryConfig::from(&Config::default());
        assert_eq!(config.report_layout, LayoutSetting::Auto);
        assert_eq!(
            config.report_layout.resolve(HidApiBackend::REPORT_LAYOUT),
            ReportLayout::Prefixed
        );
    }

    // ── device_by_serial ──

    #[test]
    fn lookup_finds_exact_serial() {
        let board = MockBoard::new(4, "ABCDE");
        let backend = MockBackend::new()
            .with_board("USBRelay2", MockBoard::new(2, "XXXXX"))
            .with_board("USBRelay4", board.clone());
        let dev = discovery(backend).device_by_serial("ABCDE").unwrap();
        assert_eq!(dev.info().serial, "ABCDE");
        assert_eq!(dev.relay_count(), 4);
        assert!(!dev.is_open());
    }

    #[test]
    fn lookup_missing_serial_is_no_device_found() {
        let backend = MockBackend::new().with_board("USBRelay2", MockBoard::new(2, "XXXXX"));
        assert!(discovery(backend)
            .device_by_serial("ABCDE")
            .unwrap_err()
            .is_no_device());
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let backend = MockBackend::new().with_board("USBRelay2", MockBoard::new(2, "ABCDE"));
        assert!(matches!(
            discovery(backend).device_by_serial("abcde"),
            Err(RelayError::NoDeviceFound)
        ));
    }

    #[test]
    fn lookup_re_enumerates_every_call() {
        let backend = Arc::new(
            MockBackend::new().with_board("USBRelay2", MockBoard::new(2, "ABCDE")),
        );
        let d = Discovery::new(backend.clone(), test_config());
        d.device_by_serial("ABCDE").unwrap();
        d.device_by_serial("ABCDE").unwrap();
        assert_eq!(backend.enumerations(), 2);
    }
}
