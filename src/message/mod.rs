// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire-level message types.
//!
//! These DTOs define the JSON payloads exchanged over the broker. They are
//! constructed per publish or receive and never persisted. Field names are
//! part of the messaging contract; renaming them breaks consumers.

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A command sent to a device's command queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    /// Target device identifier.
    pub device_id: String,
    /// Command name, e.g. `power_on`.
    pub command: String,
    /// Free-form command payload.
    #[serde(default)]
    pub payload: Value,
    /// RFC 3339 timestamp set by the sender.
    pub timestamp: String,
}

impl CommandMessage {
    /// Creates a command message stamped with the current time.
    #[must_use]
    pub fn new(device_id: impl Into<String>, command: impl Into<String>, payload: Value) -> Self {
        Self {
            device_id: device_id.into(),
            command: command.into(),
            payload,
            timestamp: Local::now().to_rfc3339(),
        }
    }

    /// Interprets the command name, if it is one the runtime knows.
    #[must_use]
    pub fn kind(&self) -> Option<CommandKind> {
        match self.command.as_str() {
            "power_on" => Some(CommandKind::PowerOn),
            "power_off" => Some(CommandKind::PowerOff),
            "status" => Some(CommandKind::Status),
            "energy" => Some(CommandKind::Energy),
            _ => None,
        }
    }
}

/// The commands a device runtime dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Switch the relay on and report status.
    PowerOn,
    /// Switch the relay off and report status.
    PowerOff,
    /// Report status out of band.
    Status,
    /// Report telemetry out of band.
    Energy,
}

/// Periodic coarse status snapshot published by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Device identifier.
    pub device_id: String,
    /// Human-readable device name.
    pub device_name: String,
    /// IP address the device answers HTTP on.
    pub ip_address: String,
    /// Whether the relay is on.
    pub power_state: bool,
    /// Current draw in watts.
    pub energy_consumption: f64,
    /// Meter reading in kWh.
    pub total_energy: f64,
    /// Reported firmware version.
    pub firmware_version: String,
    /// Seconds since the runtime started.
    pub uptime: u64,
    /// Simulated wifi signal in dBm.
    pub wifi_signal: i32,
}

/// Fine-grained energy readings inside a telemetry message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyData {
    /// Active power in watts.
    pub power: f64,
    /// Apparent power in VA.
    pub apparent_power: f64,
    /// Reactive power in var.
    pub reactive_power: f64,
    /// Power factor.
    pub factor: f64,
    /// Line voltage in volts.
    pub voltage: f64,
    /// Current in amperes.
    pub current: f64,
    /// Meter reading in kWh.
    pub total: f64,
    /// Energy consumed today in kWh.
    pub today: f64,
    /// Energy consumed yesterday in kWh.
    pub yesterday: f64,
}

/// Periodic telemetry message published by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryData {
    /// Device identifier.
    pub device_id: String,
    /// Whether the relay is on.
    pub power_state: bool,
    /// Energy readings.
    pub energy: EnergyData,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn command_round_trip() {
        let msg = CommandMessage::new("plug-001", "power_on", json!({"state": true}));
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: CommandMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.device_id, msg.device_id);
        assert_eq!(decoded.command, msg.command);
        assert_eq!(decoded.payload, msg.payload);
    }

    #[test]
    fn command_kind_mapping() {
        assert_eq!(
            CommandMessage::new("d", "power_off", json!({})).kind(),
            Some(CommandKind::PowerOff)
        );
        assert_eq!(
            CommandMessage::new("d", "energy", json!({})).kind(),
            Some(CommandKind::Energy)
        );
        assert_eq!(CommandMessage::new("d", "reboot", json!({})).kind(), None);
    }

    #[test]
    fn command_payload_defaults_to_null() {
        let decoded: CommandMessage = serde_json::from_str(
            r#"{"device_id":"d","command":"status","timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(decoded.payload.is_null());
    }

    #[test]
    fn status_response_field_names_are_stable() {
        let status = StatusResponse {
            device_id: "plug-001".into(),
            device_name: "kitchen-kettle".into(),
            ip_address: "172.25.0.100".into(),
            power_state: true,
            energy_consumption: 1850.0,
            total_energy: 42.5,
            firmware_version: "12.5.0".into(),
            uptime: 3600,
            wifi_signal: -48,
        };
        let value = serde_json::to_value(&status).unwrap();
        for key in [
            "device_id",
            "device_name",
            "ip_address",
            "power_state",
            "energy_consumption",
            "total_energy",
            "firmware_version",
            "uptime",
            "wifi_signal",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn telemetry_nests_energy_block() {
        let telemetry = TelemetryData {
            device_id: "plug-001".into(),
            power_state: true,
            energy: EnergyData {
                power: 100.0,
                apparent_power: 105.0,
                reactive_power: 10.0,
                factor: 0.9,
                voltage: 231.2,
                current: 0.433,
                total: 12.0,
                today: 0.4,
                yesterday: 1.1,
            },
            timestamp: Local::now().to_rfc3339(),
        };
        let value = serde_json::to_value(&telemetry).unwrap();
        assert!(value["energy"]["apparent_power"].is_number());
        assert!(value["energy"]["yesterday"].is_number());
    }
}
