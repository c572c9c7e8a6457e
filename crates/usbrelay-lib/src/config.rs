//! Application configuration: TOML file in the platform config directory.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::device::SetPolicy;
use crate::protocol::{MAX_SUPPORTED_RELAYS, RELAY_NAME_PREFIX, RELAY_PID, RELAY_VID, ReportLayout};

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str =
    "# usbrelay configuration. Every key is optional; missing keys use the defaults.\n\n";

/// Which feature-report read layout to assume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutSetting {
    /// Whatever the HID transport reports.
    #[default]
    Auto,
    Prefixed,
    Unprefixed,
}

impl LayoutSetting {
    /// The layout to decode with, given the one the transport advertises.
    pub fn resolve(self, transport: ReportLayout) -> ReportLayout {
        match self {
            LayoutSetting::Auto => transport,
            LayoutSetting::Prefixed => ReportLayout::Prefixed,
            LayoutSetting::Unprefixed => ReportLayout::Unprefixed,
        }
    }
}

impl fmt::Display for LayoutSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutSetting::Auto => write!(f, "auto"),
            LayoutSetting::Prefixed => write!(f, "prefixed"),
            LayoutSetting::Unprefixed => write!(f, "unprefixed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// USB vendor ID to enumerate. Default: 0x16c0.
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,

    /// USB product ID to enumerate. Default: 0x05DF.
    #[serde(default = "default_product_id")]
    pub product_id: u16,

    /// Product string prefix; the rest of the string is the channel count.
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Largest channel count accepted from a product string (1-8).
    #[serde(default = "default_max_relays")]
    pub max_relays: u8,

    /// "auto", "prefixed" or "unprefixed".
    #[serde(default)]
    pub report_layout: LayoutSetting,

    /// "always" or "skip-unchanged".
    #[serde(default)]
    pub set_policy: SetPolicy,
}

fn default_vendor_id() -> u16 {
    RELAY_VID
}
fn default_product_id() -> u16 {
    RELAY_PID
}
fn default_name_prefix() -> String {
    RELAY_NAME_PREFIX.into()
}
fn default_max_relays() -> u8 {
    MAX_SUPPORTED_RELAYS
}

impl Default for Config {
    fn default() -> Self {
        Config {
            vendor_id: default_vendor_id(),
            product_id: default_product_id(),
            name_prefix: default_name_prefix(),
            max_relays: default_max_relays(),
            report_layout: LayoutSetting::default(),
            set_policy: SetPolicy::default(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `vendor_id` or `product_id` is zero.
    ZeroId(&'static str),
    /// `name_prefix` is empty or whitespace-only.
    EmptyNamePrefix,
    /// `max_relays` is outside `1..=MAX_SUPPORTED_RELAYS`.
    InvalidMaxRelays(u8),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ZeroId(field) => write!(f, "Invalid {field}: must not be 0"),
            ValidationError::EmptyNamePrefix => write!(f, "name_prefix cannot be empty"),
            ValidationError::InvalidMaxRelays(n) => write!(
                f,
                "Invalid max_relays {n}: must be 1-{MAX_SUPPORTED_RELAYS}"
            ),
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("usbrelay"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from disk, or return defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Load config from an arbitrary path.
    ///
    /// A missing file yields `(defaults, [])`; an unparseable one yields
    /// `(defaults, [warning])`.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        if std::fs::rename(&tmp, path).is_err() {
            // Rename can fail across filesystems.
            let result = std::fs::write(path, &contents);
            let _ = std::fs::remove_file(&tmp);
            return result;
        }
        Ok(())
    }

    /// Save config to the default platform path.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config directory",
            ));
        };
        self.save_to(&path)
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if self.vendor_id == 0 {
            errors.push(ValidationError::ZeroId("vendor_id"));
        }
        if self.product_id == 0 {
            errors.push(ValidationError::ZeroId("product_id"));
        }
        if self.name_prefix.trim().is_empty() {
            errors.push(ValidationError::EmptyNamePrefix);
        }
        if !(1..=MAX_SUPPORTED_RELAYS).contains(&self.max_relays) {
            errors.push(ValidationError::InvalidMaxRelays(self.max_relays));
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// [`validate`](Self::validate) folded into a single [`RelayError::Config`](crate::RelayError::Config).
    pub fn check(&self) -> crate::error::Result<()> {
        self.validate().map_err(|errors| {
            let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            crate::RelayError::Config(joined.join("; "))
        })
    }
}
