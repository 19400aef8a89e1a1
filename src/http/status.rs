// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Firmware-style `Status` documents.
//!
//! `Status 0` is the combined blob real plugs answer with; levels 1-12
//! return the narrower sub-documents. Fixed hardware figures (heap, flash
//! layout, drivers) are canned; everything electrical is sourced live from
//! the power model. Levels 8 and 10 both answer with the sensor document,
//! as the firmware does.

use chrono::{DateTime, Local};
use serde_json::{Value, json};

use crate::state::DeviceInfo;

/// Live inputs for rendering one status document.
#[derive(Debug)]
pub struct StatusContext<'a> {
    /// Device identifier (doubles as hostname and broker topic).
    pub device_id: &'a str,
    /// Human-readable device name.
    pub device_name: &'a str,
    /// Reported IP address.
    pub ip_address: &'a str,
    /// Snapshot of the device's power model.
    pub info: &'a DeviceInfo,
    /// When this device's HTTP surface came up.
    pub started_at: DateTime<Local>,
    /// Render time.
    pub now: DateTime<Local>,
}

impl StatusContext<'_> {
    /// Deterministic per-device line voltage in the 225-235 V band.
    #[must_use]
    pub fn voltage(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let offset = (id_hash(self.device_id) % 10) as f64 - 5.0;
        230.0 + offset
    }

    /// Current draw derived from live power and the derived voltage.
    #[must_use]
    pub fn current(&self) -> f64 {
        let voltage = self.voltage();
        if voltage > 0.0 {
            self.info.current_watts / voltage
        } else {
            0.0
        }
    }

    fn uptime_secs(&self) -> i64 {
        (self.now - self.started_at).num_seconds().max(0)
    }

    fn uptime_text(&self) -> String {
        let secs = self.uptime_secs();
        format!("0T{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }

    fn timestamp(&self) -> String {
        self.now.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

/// Renders the document for one status level.
///
/// Levels outside `0..=12` must be rejected before calling; unknown
/// levels fall back to the combined document like the firmware does.
#[must_use]
pub fn render(level: u8, ctx: &StatusContext<'_>) -> Value {
    match level {
        1 => json!({ "Status": device_doc(ctx) }),
        2 => json!({ "StatusFWR": firmware_doc() }),
        3 => json!({ "StatusLOG": logging_doc() }),
        4 => json!({ "StatusMEM": memory_doc() }),
        5 => json!({ "StatusNET": network_doc(ctx) }),
        6 => json!({ "StatusMQT": broker_doc(ctx) }),
        7 => json!({ "StatusTIM": time_doc(ctx) }),
        8 | 10 => json!({ "StatusSNS": sensor_doc(ctx) }),
        9 => json!({ "StatusPTH": thresholds_doc(ctx) }),
        11 => json!({ "StatusSTS": state_doc(ctx) }),
        12 => json!({ "StatusCRASH": crash_doc() }),
        _ => json!({
            "Status": device_doc(ctx),
            "StatusPRM": parameters_doc(ctx),
            "StatusFWR": firmware_doc(),
            "StatusLOG": logging_doc(),
            "StatusMEM": memory_doc(),
            "StatusNET": network_doc(ctx),
            "StatusMQT": broker_doc(ctx),
            "StatusTIM": time_doc(ctx),
            "StatusSTS": state_doc(ctx),
        }),
    }
}

fn device_doc(ctx: &StatusContext<'_>) -> Value {
    json!({
        "Module": 1,
        "DeviceName": ctx.device_name,
        "FriendlyName": [ctx.device_name],
        "Topic": ctx.device_id,
        "ButtonTopic": "0",
        "Power": i32::from(ctx.info.power_state),
        "PowerOnState": 3,
        "LedState": 1,
        "LedMask": "FFFF",
        "SaveData": 1,
        "SaveState": 1,
        "SwitchTopic": "0",
        "SwitchMode": [0, 0, 0, 0, 0, 0, 0, 0],
        "ButtonRetain": 0,
        "SwitchRetain": 0,
        "SensorRetain": 0,
        "PowerRetain": 0,
        "InfoRetain": 0,
        "StateRetain": 0,
    })
}

fn parameters_doc(ctx: &StatusContext<'_>) -> Value {
    json!({
        "Baudrate": 115_200,
        "SerialConfig": "8N1",
        "GroupTopic": "tasmotas",
        "OtaUrl": "http://ota.tasmota.com/tasmota/release-12.5.0/tasmota.bin.gz",
        "RestartReason": "Software/System restart",
        "Uptime": ctx.uptime_text(),
        "StartupUTC": ctx.started_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
        "Sleep": 50,
        "CfgHolder": 4617,
        "BootCount": 45,
        "BCResetTime": "2020-02-13T15:08:27",
        "SaveCount": 164,
        "SaveAddress": "FB000",
    })
}

fn firmware_doc() -> Value {
    json!({
        "Version": "12.5.0(tasmota)",
        "BuildDateTime": "2023-12-01T10:00:00",
        "Boot": 31,
        "Core": "2_7_4",
        "SDK": "2.2.2-dev(38a443e)",
        "CpuFrequency": 80,
        "Hardware": "ESP8266EX",
        "CR": "394/699",
    })
}

fn logging_doc() -> Value {
    json!({
        "SerialLog": 2,
        "WebLog": 2,
        "MqttLog": 0,
        "SysLog": 0,
        "LogHost": "",
        "LogPort": 514,
        "SSId": ["WiFi-Network", ""],
        "TelePeriod": 300,
        "Resolution": "558180C0",
        "SetOption": [
            "00008009",
            "2805C80001000600003C5A0A192800000000",
            "00000080",
            "00006000",
            "00004000",
        ],
    })
}

fn memory_doc() -> Value {
    json!({
        "ProgramSize": 595,
        "Free": 404,
        "Heap": 25,
        "ProgramFlashSize": 1024,
        "FlashSize": 1024,
        "FlashChipId": "1640E0",
        "FlashFrequency": 40,
        "FlashMode": 3,
        "Features": [
            "00000809", "8F9AC787", "04368001", "000000CF",
            "010013C0", "C000F981", "00004004", "00001000",
        ],
        "Drivers": "1,2,3,4,5,6,7,8,9,10,12,16,18,19,20,21,22,24,26,27,29,30,35,37,45",
        "Sensors": "1,2,3,4,5,6",
    })
}

fn network_doc(ctx: &StatusContext<'_>) -> Value {
    json!({
        "Hostname": ctx.device_id,
        "IPAddress": ctx.ip_address,
        "Gateway": "172.25.0.1",
        "Subnetmask": "255.255.0.0",
        "DNSServer1": "8.8.8.8",
        "DNSServer2": "8.8.4.4",
        "Mac": format!("AA:BB:CC:DD:EE:{:02X}", id_hash(ctx.device_id) % 256),
        "Webserver": 2,
        "HTTP_API": 1,
        "WifiConfig": 4,
        "WifiPower": 17.0,
    })
}

fn broker_doc(ctx: &StatusContext<'_>) -> Value {
    json!({
        "MqttHost": "172.25.0.10",
        "MqttPort": 1883,
        "MqttClientMask": ctx.device_id,
        "MqttClient": ctx.device_id,
        "MqttUser": "admin",
        "MqttCount": 1,
        "MAX_PACKET_SIZE": 1200,
        "KEEPALIVE": 30,
        "SOCKET_TIMEOUT": 4,
    })
}

fn time_doc(ctx: &StatusContext<'_>) -> Value {
    json!({
        "UTC": ctx.timestamp(),
        "Local": ctx.timestamp(),
        "StartDST": "2024-03-31T02:00:00",
        "EndDST": "2024-10-27T03:00:00",
        "Timezone": "+01:00",
        "Sunrise": "06:30",
        "Sunset": "18:45",
    })
}

/// Power-monitoring thresholds. Carries the live `ENERGY` block so power
/// tooling querying `Status 9` sees actual readings next to the limits.
fn thresholds_doc(ctx: &StatusContext<'_>) -> Value {
    json!({
        "PowerLow": 0,
        "PowerHigh": 0,
        "VoltageLow": 0,
        "VoltageHigh": 0,
        "CurrentLow": 0,
        "CurrentHigh": 0,
        "ENERGY": energy_doc(ctx),
    })
}

fn sensor_doc(ctx: &StatusContext<'_>) -> Value {
    json!({
        "Time": ctx.timestamp(),
        "ENERGY": energy_doc(ctx),
    })
}

fn energy_doc(ctx: &StatusContext<'_>) -> Value {
    let watts = ctx.info.current_watts;
    #[allow(clippy::cast_possible_truncation)]
    let period = (watts * 5.0) as i64;
    json!({
        "TotalStartTime": ctx.started_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
        "Total": ctx.info.total_energy_kwh,
        "Yesterday": ctx.info.total_energy_kwh * 0.08,
        "Today": ctx.info.total_energy_kwh * 0.1,
        "Period": period,
        "Power": watts,
        "ApparentPower": watts * 1.05,
        "ReactivePower": watts * 0.1,
        "Factor": 0.95,
        "Voltage": ctx.voltage(),
        "Current": ctx.current(),
    })
}

fn state_doc(ctx: &StatusContext<'_>) -> Value {
    let signal = 50 + id_hash(ctx.device_id) % 30;
    json!({
        "Time": ctx.timestamp(),
        "Uptime": ctx.uptime_text(),
        "UptimeSec": ctx.uptime_secs(),
        "Heap": 25,
        "SleepMode": "Dynamic",
        "Sleep": 50,
        "LoadAvg": 19,
        "MqttCount": 1,
        "POWER": if ctx.info.power_state { "ON" } else { "OFF" },
        "Wifi": {
            "AP": 1,
            "SSId": "WiFi-Network",
            "BSSId": "AA:BB:CC:DD:EE:FF",
            "Channel": 6,
            "Mode": "11n",
            "RSSI": signal,
            "Signal": -i64::try_from(signal).unwrap_or(50),
            "LinkCount": 1,
            "Downtime": "0T00:00:03",
        },
    })
}

fn crash_doc() -> Value {
    json!({
        "CrashDump": "No crash dump available",
        "StackTrace": [],
    })
}

/// Stable non-cryptographic hash used to vary canned figures per device.
fn id_hash(id: &str) -> u64 {
    id.bytes()
        .fold(0u64, |h, b| h.wrapping_mul(31).wrapping_add(u64::from(b)))
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::state::PowerRegistry;

    fn context(info: &DeviceInfo) -> StatusContext<'_> {
        let now = Local::now();
        StatusContext {
            device_id: "plug-001",
            device_name: "kitchen-kettle",
            ip_address: "172.25.0.100",
            info,
            started_at: now - ChronoDuration::seconds(3725),
            now,
        }
    }

    fn sample_info() -> DeviceInfo {
        let registry = PowerRegistry::new();
        registry.assign_profile_seeded("plug-001", "Kettle", 11);
        registry.set_power_state("plug-001", true);
        registry.device_info("plug-001")
    }

    #[test]
    fn combined_blob_has_all_sections() {
        let info = sample_info();
        let blob = render(0, &context(&info));
        for key in [
            "Status", "StatusPRM", "StatusFWR", "StatusLOG", "StatusMEM",
            "StatusNET", "StatusMQT", "StatusTIM", "StatusSTS",
        ] {
            assert!(blob.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn level_nine_carries_energy_block() {
        let info = sample_info();
        let blob = render(9, &context(&info));
        let energy = &blob["StatusPTH"]["ENERGY"];
        for key in ["Power", "Voltage", "Current"] {
            assert!(energy.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn sensor_levels_share_the_energy_document() {
        let info = sample_info();
        let ctx = context(&info);
        let eight = render(8, &ctx);
        let ten = render(10, &ctx);
        assert_eq!(
            eight["StatusSNS"]["ENERGY"]["Total"],
            ten["StatusSNS"]["ENERGY"]["Total"]
        );
    }

    #[test]
    fn power_field_follows_relay_state() {
        let info = sample_info();
        let blob = render(1, &context(&info));
        assert_eq!(blob["Status"]["Power"], 1);
        assert_eq!(blob["Status"]["Topic"], "plug-001");
    }

    #[test]
    fn state_doc_reports_uptime() {
        let info = sample_info();
        let blob = render(11, &context(&info));
        assert_eq!(blob["StatusSTS"]["Uptime"], "0T01:02:05");
        assert_eq!(blob["StatusSTS"]["POWER"], "ON");
    }

    #[test]
    fn voltage_stays_in_band() {
        let info = sample_info();
        let ctx = context(&info);
        assert!((225.0..235.0).contains(&ctx.voltage()));
        assert!(ctx.current() >= 0.0);
    }
}
