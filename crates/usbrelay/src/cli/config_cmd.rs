//! `config` subcommand: show the effective configuration and its file path.

use std::path::Path;

use usbrelay_lib::hid::HidApiBackend;

use super::{Config, ConfigOutput, Result, kv, kv_indent, kv_width, load_config, print_json};

pub(super) fn cmd_config(json: bool, custom_path: Option<&Path>) -> Result<()> {
    let config = load_config(custom_path);
    let config_path = custom_path.map(|p| p.to_path_buf()).or_else(Config::path);
    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let layout = config.report_layout.resolve(HidApiBackend::REPORT_LAYOUT);
    let problems: Vec<String> = match config.validate() {
        Ok(()) => vec![],
        Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
    };

    if json {
        return print_json(&ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            settings: config,
            effective_report_layout: format!("{layout:?}").to_lowercase(),
            problems,
        });
    }

    let w = kv_width(
        &["Config file:"],
        &[
            "vendor_id:",
            "product_id:",
            "name_prefix:",
            "max_relays:",
            "report_layout:",
            "set_policy:",
        ],
    );

    match &config_path {
        Some(p) if config_exists => kv("Config file:", format_args!("{} (loaded)", p.display()), w),
        Some(p) => kv(
            "Config file:",
            format_args!("{} (not found, using defaults)", p.display()),
            w,
        ),
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    println!("Settings:");
    kv_indent("vendor_id:", format_args!("0x{:04x}", config.vendor_id), w);
    kv_indent("product_id:", format_args!("0x{:04x}", config.product_id), w);
    kv_indent("name_prefix:", &config.name_prefix, w);
    kv_indent("max_relays:", config.max_relays, w);
    kv_indent(
        "report_layout:",
        format_args!("{} ({layout:?})", config.report_layout),
        w,
    );
    kv_indent("set_policy:", config.set_policy, w);

    if !problems.is_empty() {
        println!();
        println!("Problems:");
        for p in &problems {
            println!("  {p}");
        }
    }
    Ok(())
}
