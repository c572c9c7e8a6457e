//! `list` subcommand: enumerate connected relay boards.

use std::path::Path;

use usbrelay_lib::RelayError;

use super::{ListOutput, Result, discovery, print_json};

pub(super) fn cmd_list(simple: bool, json: bool, config_path: Option<&Path>) -> Result<()> {
    let devices = discovery(config_path)?.enumerate()?;
    // Same outcome as an empty HID enumeration.
    if devices.is_empty() {
        return Err(RelayError::NoDeviceFound);
    }

    if json {
        let summaries: Vec<_> = devices.iter().map(|d| d.info()).collect();
        return print_json(&ListOutput {
            count: summaries.len(),
            devices: summaries,
        });
    }

    if simple {
        for dev in &devices {
            println!("{dev}");
        }
        return Ok(());
    }

    let rows: Vec<[String; 4]> = devices
        .iter()
        .map(|d| {
            let info = d.info();
            [
                info.serial,
                info.relay_count.to_string(),
                format!("0x{:04x}", info.vendor_id),
                format!("0x{:04x}", info.product_id),
            ]
        })
        .collect();
    print_table(&["Serial", "Relays", "Vendor", "Product"], &rows);
    Ok(())
}

fn print_table(headers: &[&str; 4], rows: &[[String; 4]]) {
    let mut widths = [0usize; 4];
    for (w, h) in widths.iter_mut().zip(headers) {
        *w = h.len();
    }
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }
    let line = |cells: [&str; 4]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(widths)
            .map(|(c, w)| format!("{c:<w$}"))
            .collect();
        println!("{}", padded.join("  ").trim_end());
    };
    line(*headers);
    line(widths.map(|w| "-".repeat(w)).each_ref().map(String::as_str));
    for row in rows {
        line(row.each_ref().map(String::as_str));
    }
}
