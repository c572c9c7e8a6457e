//! `status` subcommand: read every relay on one board.

use std::path::Path;

use super::{Result, StatusOutput, discovery, kv, kv_indent, kv_width, print_json, with_open};

pub(super) fn cmd_status(serial: &str, json: bool, config_path: Option<&Path>) -> Result<()> {
    let dev = discovery(config_path)?.device_by_serial(serial)?;
    let relays = with_open(&dev, true, |dev| Ok(dev.cached_states()))?;
    let info = dev.info();

    if json {
        return print_json(&StatusOutput {
            device: info,
            relays,
        });
    }

    let labels: Vec<String> = relays.iter().map(|(ch, _)| format!("Relay {ch}:")).collect();
    let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();
    let w = kv_width(&["Serial:", "Relays:", "Path:"], &label_refs);

    kv("Serial:", &info.serial, w);
    kv("Relays:", info.relay_count, w);
    kv("Path:", &info.path, w);
    println!();
    for ((_, state), label) in relays.iter().zip(&labels) {
        kv_indent(label, state, w);
    }
    Ok(())
}
