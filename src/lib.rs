// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `tasmosim` - A simulated Tasmota smart-plug fleet.
//!
//! This library simulates smart plugs the way orchestration and monitoring
//! tools see real ones: each device holds a realistic power-consumption
//! model, speaks MQTT (periodic status and telemetry, a per-device command
//! queue) and serves the firmware's HTTP command API.
//!
//! # Components
//!
//! - **Power model**: per-category consumption profiles with time-of-day,
//!   seasonal and duty-cycle behavior plus bounded noise
//!   ([`profile`], [`state`])
//! - **Messaging**: broker client with retrying connect, QoS 1
//!   publish/subscribe and response listening ([`messaging`])
//! - **Device runtime**: the per-plug state machine driving publishers
//!   and the command consumer ([`device`])
//! - **HTTP surface**: firmware-compatible `/cm`, status and power
//!   endpoints ([`http`])
//!
//! # Quick Start
//!
//! ```no_run
//! use tasmosim::device::{DeviceConfig, DeviceRuntime};
//! use tasmosim::state::PowerRegistry;
//!
//! #[tokio::main]
//! async fn main() -> tasmosim::Result<()> {
//!     let registry = PowerRegistry::new();
//!
//!     let config = DeviceConfig::builder("plug-001")
//!         .device_name("kitchen-kettle")
//!         .ip_address("172.25.0.100")
//!         .broker("localhost", 1883)
//!         .broker_credentials("admin", "admin")
//!         .build();
//!
//!     let mut runtime = DeviceRuntime::new(config, registry.clone());
//!     runtime.start().await?;
//!
//!     // The same registry backs the HTTP surface and ad-hoc queries.
//!     println!("{:?}", registry.device_info("plug-001"));
//!
//!     runtime.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Sending commands
//!
//! ```no_run
//! use std::time::Duration;
//! use serde_json::json;
//! use tasmosim::messaging::Messaging;
//!
//! # async fn example() -> Result<(), tasmosim::error::ProtocolError> {
//! let messaging = Messaging::builder()
//!     .host("localhost")
//!     .clean_session(true)
//!     .build();
//! messaging.connect().await?;
//!
//! messaging.send_command("plug-001", "power_on", json!({})).await?;
//! let reply = messaging
//!     .await_device_reply("plug-001", Duration::from_secs(10))
//!     .await?;
//! println!("{}: {}", reply.routing_key, reply.body);
//! # Ok(())
//! # }
//! ```

pub mod device;
pub mod error;
pub mod http;
pub mod message;
pub mod messaging;
pub mod profile;
pub mod state;

pub use device::{DeviceConfig, DeviceRuntime, RunState};
pub use error::{Error, ParseError, ProtocolError, Result, ValueError};
pub use message::{CommandMessage, EnergyData, StatusResponse, TelemetryData};
pub use messaging::{Channel, Messaging, MessagingBuilder, RetryPolicy};
pub use profile::{CyclePattern, DeviceCategory, PowerProfile};
pub use state::{DeviceInfo, DevicePowerState, PowerRegistry};
