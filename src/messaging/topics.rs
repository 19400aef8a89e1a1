// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic layout for the three logical channels.
//!
//! Messages flow over three channels — commands, status, telemetry — each
//! filtered by device id. On the wire these map to MQTT topics
//! (`device/command/<id>` and so on); listener callbacks additionally see
//! the dotted routing-key form (`device.command.<id>`) that fleet tooling
//! filters on.

use crate::error::ParseError;

/// The logical channel a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Commands addressed to a device.
    Command,
    /// Coarse status snapshots published by a device.
    Status,
    /// Fine-grained telemetry published by a device.
    Telemetry,
}

impl Channel {
    /// Logical channel name as seen by listener callbacks.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "commands",
            Self::Status => "status",
            Self::Telemetry => "telemetry",
        }
    }

    const fn segment(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Status => "status",
            Self::Telemetry => "telemetry",
        }
    }

    /// MQTT topic carrying this channel for one device.
    #[must_use]
    pub fn topic(&self, device_id: &str) -> String {
        format!("device/{}/{device_id}", self.segment())
    }

    /// Wildcard subscription matching this channel for all devices.
    #[must_use]
    pub fn wildcard(&self) -> String {
        format!("device/{}/+", self.segment())
    }

    /// Dotted routing key for one device, e.g. `device.status.plug-001`.
    #[must_use]
    pub fn routing_key(&self, device_id: &str) -> String {
        format!("device.{}.{device_id}", self.segment())
    }
}

/// Splits an MQTT topic into its channel and device id.
///
/// # Errors
///
/// Returns [`ParseError::UnknownTopic`] for topics outside the layout.
pub fn parse(topic: &str) -> Result<(Channel, &str), ParseError> {
    let mut parts = topic.splitn(3, '/');
    let (Some("device"), Some(channel), Some(device_id)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::UnknownTopic(topic.to_string()));
    };
    if device_id.is_empty() || device_id.contains('/') {
        return Err(ParseError::UnknownTopic(topic.to_string()));
    }
    let channel = match channel {
        "command" => Channel::Command,
        "status" => Channel::Status,
        "telemetry" => Channel::Telemetry,
        _ => return Err(ParseError::UnknownTopic(topic.to_string())),
    };
    Ok((channel, device_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_layout() {
        assert_eq!(Channel::Command.topic("plug-001"), "device/command/plug-001");
        assert_eq!(Channel::Status.topic("plug-001"), "device/status/plug-001");
        assert_eq!(
            Channel::Telemetry.topic("plug-001"),
            "device/telemetry/plug-001"
        );
    }

    #[test]
    fn wildcards() {
        assert_eq!(Channel::Status.wildcard(), "device/status/+");
        assert_eq!(Channel::Telemetry.wildcard(), "device/telemetry/+");
    }

    #[test]
    fn routing_keys_use_dots() {
        assert_eq!(
            Channel::Command.routing_key("plug-001"),
            "device.command.plug-001"
        );
    }

    #[test]
    fn parse_round_trips() {
        for channel in [Channel::Command, Channel::Status, Channel::Telemetry] {
            let topic = channel.topic("plug-042");
            let (parsed, id) = parse(&topic).unwrap();
            assert_eq!(parsed, channel);
            assert_eq!(id, "plug-042");
        }
    }

    #[test]
    fn parse_rejects_foreign_topics() {
        assert!(parse("tele/plug/STATE").is_err());
        assert!(parse("device/unknown/plug-001").is_err());
        assert!(parse("device/status").is_err());
        assert!(parse("device/status/").is_err());
        assert!(parse("device/status/a/b").is_err());
    }
}
