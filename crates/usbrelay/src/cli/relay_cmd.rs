//! `on`, `off` and `toggle` subcommands.

use std::path::Path;

use super::{RelayOutput, Result, Target, discovery, print_json, with_open};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Action {
    On,
    Off,
    Toggle,
}

impl Action {
    fn name(self) -> &'static str {
        match self {
            Action::On => "on",
            Action::Off => "off",
            Action::Toggle => "toggle",
        }
    }

    /// Toggle needs the real states before it can pick the opposite.
    fn needs_fresh_state(self) -> bool {
        self == Action::Toggle
    }
}

pub(super) fn cmd_relay(
    action: Action,
    serial: &str,
    target: Target,
    json: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let dev = discovery(config_path)?.device_by_serial(serial)?;
    let relays = with_open(&dev, action.needs_fresh_state(), |dev| {
        match action {
            Action::On => dev.on(target)?,
            Action::Off => dev.off(target)?,
            Action::Toggle => dev.toggle(target)?,
        }
        Ok(dev.cached_states())
    })?;

    if json {
        return print_json(&RelayOutput {
            serial: serial.to_string(),
            action: action.name(),
            target: target.to_string(),
            relays,
        });
    }

    match target {
        Target::Single(ch) => {
            let state = relays.get(ch).unwrap_or_default();
            println!("{serial}: relay {ch} {state}");
        }
        Target::All => {
            for (ch, state) in relays.iter() {
                println!("{serial}: relay {ch} {state}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_toggle_reads_before_writing() {
        assert!(Action::Toggle.needs_fresh_state());
        assert!(!Action::On.needs_fresh_state());
        assert!(!Action::Off.needs_fresh_state());
    }

    #[test]
    fn action_names() {
        assert_eq!(Action::On.name(), "on");
        assert_eq!(Action::Toggle.name(), "toggle");
    }
}
