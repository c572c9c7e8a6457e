//! CLI subcommands: listing, switching, status, serial numbers, configuration.

mod config_cmd;
mod list;
mod relay_cmd;
mod set_serial;
mod status;

use std::path::Path;

use clap::Subcommand;
use serde::Serialize;

pub(super) use usbrelay_lib::config::Config;
pub(super) use usbrelay_lib::device::{DeviceSummary, RelayDevice};
pub(super) use usbrelay_lib::discovery::Discovery;
pub(super) use usbrelay_lib::error::Result;
pub(super) use usbrelay_lib::relay::{RelayStates, SerialNumber, Target};

/// Printed after a "no device" error.
pub const NO_DEVICE_HINT: &str = "\
No USB relay board was found. Check that the board is plugged in and that \
your user may access it (on Linux, a udev rule granting access to \
16c0:05df hidraw devices is usually required).";

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w.saturating_sub(2));
}

pub(super) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(std::io::Error::from)?;
    println!("{text}");
    Ok(())
}

/// Config from `--config <path>` if given, else from the platform default.
pub(super) fn load_config(custom_path: Option<&Path>) -> Config {
    match custom_path {
        Some(path) => {
            if !path.exists() {
                log::warn!("config file {} not found, using defaults", path.display());
            }
            let (config, warnings) = Config::load_from(path);
            for w in &warnings {
                log::warn!("{w}");
            }
            config
        }
        None => Config::load(),
    }
}

/// Validated config plus a discovery over the system HID stack.
pub(super) fn discovery(custom_path: Option<&Path>) -> Result<Discovery> {
    let config = load_config(custom_path);
    config.check()?;
    Discovery::hidapi(&config)
}

/// Run `f` against an open device, then close it whatever `f` returned.
pub(super) fn with_open<T>(
    dev: &RelayDevice,
    verify: bool,
    f: impl FnOnce(&RelayDevice) -> Result<T>,
) -> Result<T> {
    dev.open(verify)?;
    let result = f(dev);
    let closed = dev.close();
    let value = result?;
    closed?;
    Ok(value)
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct ListOutput {
    pub count: usize,
    pub devices: Vec<DeviceSummary>,
}

#[derive(Serialize)]
pub(super) struct RelayOutput {
    pub serial: String,
    pub action: &'static str,
    pub target: String,
    pub relays: RelayStates,
}

#[derive(Serialize)]
pub(super) struct StatusOutput {
    pub device: DeviceSummary,
    pub relays: RelayStates,
}

#[derive(Serialize)]
pub(super) struct SetSerialOutput {
    pub old_serial: String,
    pub new_serial: String,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
    pub effective_report_layout: String,
    pub problems: Vec<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// List connected relay boards
    List {
        /// One `serial:relays:vendor:product` line per board
        #[arg(short, long)]
        simple: bool,
    },

    /// Switch a relay (or all relays) on
    On {
        /// Board serial number (case-sensitive)
        serial: String,
        /// Relay number, or "all"
        relay: Target,
    },

    /// Switch a relay (or all relays) off
    Off {
        /// Board serial number (case-sensitive)
        serial: String,
        /// Relay number, or "all"
        relay: Target,
    },

    /// Flip a relay (or every relay, one at a time)
    Toggle {
        /// Board serial number (case-sensitive)
        serial: String,
        /// Relay number, or "all"
        relay: Target,
    },

    /// Show the state of every relay on a board
    Status {
        /// Board serial number (case-sensitive)
        serial: String,
    },

    /// Write a new serial number to a board
    SetSerial {
        /// Current serial number
        serial: String,
        /// New serial number (1-5 printable ASCII characters)
        new_serial: SerialNumber,
    },

    /// Show current configuration and file path
    Config,
}

pub fn run(cmd: Command, json: bool, config_path: Option<&Path>) -> Result<()> {
    match cmd {
        Command::List { simple } => list::cmd_list(simple, json, config_path),
        Command::On { serial, relay } => {
            relay_cmd::cmd_relay(relay_cmd::Action::On, &serial, relay, json, config_path)
        }
        Command::Off { serial, relay } => {
            relay_cmd::cmd_relay(relay_cmd::Action::Off, &serial, relay, json, config_path)
        }
        Command::Toggle { serial, relay } => {
            relay_cmd::cmd_relay(relay_cmd::Action::Toggle, &serial, relay, json, config_path)
        }
        Command::Status { serial } => status::cmd_status(&serial, json, config_path),
        Command::SetSerial { serial, new_serial } => {
            set_serial::cmd_set_serial(&serial, &new_serial, json, config_path)
        }
        Command::Config => config_cmd::cmd_config(json, config_path),
    }
}
