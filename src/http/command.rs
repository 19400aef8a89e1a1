// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parser for the firmware text-command syntax used by `/cm?cmnd=`.
//!
//! Real plugs accept commands like `Power TOGGLE` or `Status 9` as a
//! single query parameter. Command and parameter are case-insensitive.

use crate::error::ValueError;

/// Highest supported status level.
pub const MAX_STATUS_LEVEL: u8 = 12;

/// Parameter of a `Power` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    /// Switch the relay on.
    On,
    /// Switch the relay off.
    Off,
    /// Invert the relay.
    Toggle,
}

/// A parsed text command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `Power [ON|OFF|TOGGLE]`; no parameter queries the current state.
    Power(Option<PowerAction>),
    /// `Status [0-12]`; no parameter means level 0.
    Status(u8),
}

/// Parses a `cmnd` query value.
///
/// # Errors
///
/// Returns a [`ValueError`] for unknown commands, invalid power
/// parameters or status levels outside `0..=12`.
pub fn parse(cmnd: &str) -> Result<Command, ValueError> {
    let mut parts = cmnd.split_whitespace();
    let Some(command) = parts.next() else {
        return Err(ValueError::UnknownCommand(String::new()));
    };
    let parameter = parts.next();

    if command.eq_ignore_ascii_case("power") {
        let action = match parameter {
            None => None,
            Some(p) if p.eq_ignore_ascii_case("toggle") => Some(PowerAction::Toggle),
            Some(p)
                if p.eq_ignore_ascii_case("on")
                    || p == "1"
                    || p.eq_ignore_ascii_case("true") =>
            {
                Some(PowerAction::On)
            }
            Some(p)
                if p.eq_ignore_ascii_case("off")
                    || p == "0"
                    || p.eq_ignore_ascii_case("false") =>
            {
                Some(PowerAction::Off)
            }
            Some(p) => return Err(ValueError::InvalidPowerState(p.to_string())),
        };
        return Ok(Command::Power(action));
    }

    if command.eq_ignore_ascii_case("status") {
        let level = match parameter {
            None => 0,
            Some(p) => p
                .parse::<u8>()
                .ok()
                .filter(|level| *level <= MAX_STATUS_LEVEL)
                .ok_or_else(|| ValueError::InvalidStatusLevel(p.to_string()))?,
        };
        return Ok(Command::Status(level));
    }

    Err(ValueError::UnknownCommand(command.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_actions() {
        assert_eq!(
            parse("Power TOGGLE").unwrap(),
            Command::Power(Some(PowerAction::Toggle))
        );
        assert_eq!(
            parse("power on").unwrap(),
            Command::Power(Some(PowerAction::On))
        );
        assert_eq!(
            parse("POWER 0").unwrap(),
            Command::Power(Some(PowerAction::Off))
        );
        assert_eq!(
            parse("Power true").unwrap(),
            Command::Power(Some(PowerAction::On))
        );
        assert_eq!(parse("Power").unwrap(), Command::Power(None));
    }

    #[test]
    fn invalid_power_parameter() {
        assert!(matches!(
            parse("Power sideways"),
            Err(ValueError::InvalidPowerState(_))
        ));
    }

    #[test]
    fn status_levels() {
        assert_eq!(parse("Status").unwrap(), Command::Status(0));
        assert_eq!(parse("Status 0").unwrap(), Command::Status(0));
        assert_eq!(parse("status 9").unwrap(), Command::Status(9));
        assert_eq!(parse("STATUS 12").unwrap(), Command::Status(12));
    }

    #[test]
    fn status_level_out_of_range() {
        assert!(matches!(
            parse("Status 13"),
            Err(ValueError::InvalidStatusLevel(_))
        ));
        assert!(matches!(
            parse("Status -1"),
            Err(ValueError::InvalidStatusLevel(_))
        ));
        assert!(matches!(
            parse("Status nine"),
            Err(ValueError::InvalidStatusLevel(_))
        ));
    }

    #[test]
    fn unknown_commands_rejected() {
        assert!(matches!(
            parse("Reboot"),
            Err(ValueError::UnknownCommand(_))
        ));
        assert!(matches!(parse(""), Err(ValueError::UnknownCommand(_))));
        assert!(matches!(parse("   "), Err(ValueError::UnknownCommand(_))));
    }
}
