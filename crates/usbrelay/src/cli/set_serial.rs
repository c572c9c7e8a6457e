//! `set-serial` subcommand.

use std::path::Path;

use super::{Result, SerialNumber, SetSerialOutput, discovery, print_json, with_open};

pub(super) fn cmd_set_serial(
    serial: &str,
    new_serial: &SerialNumber,
    json: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let dev = discovery(config_path)?.device_by_serial(serial)?;
    with_open(&dev, false, |dev| dev.set_serial_number(new_serial))?;

    if json {
        return print_json(&SetSerialOutput {
            old_serial: serial.to_string(),
            new_serial: new_serial.to_string(),
        });
    }
    println!("Serial changed: {serial} -> {new_serial}");
    Ok(())
}
