//! usbrelay: command-line control for USB HID relay boards.

use std::path::PathBuf;

use clap::Parser;

mod cli;

#[derive(Parser)]
#[command(
    name = "usbrelay",
    version,
    about = "Control dcttech-style USB HID relay boards"
)]
struct Args {
    /// Output as JSON (for list, on, off, toggle, status, set-serial, config)
    #[arg(long, global = true)]
    json: bool,

    /// Log every feature report sent and received
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Read settings from this file instead of the default config path
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: cli::Command,
}

fn main() {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    if let Err(e) = cli::run(args.command, args.json, args.config.as_deref()) {
        eprintln!("Error: {e}");
        if e.is_no_device() {
            eprintln!("{}", cli::NO_DEVICE_HINT);
        }
        std::process::exit(1);
    }
}
