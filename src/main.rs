// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device simulator entry point.
//!
//! Runs one simulated plug per process: broker runtime plus the HTTP
//! control surface, sharing a single power registry. Designed for
//! container deployment, so every flag also reads from the environment.

use std::net::SocketAddr;
use std::process::ExitCode;

use clap::Parser;

use tasmosim::device::{DeviceConfig, DeviceRuntime};
use tasmosim::http::{self, AppState, HttpConfig};
use tasmosim::profile::{DeviceCategory, catalog};
use tasmosim::state::PowerRegistry;

#[derive(Parser, Debug)]
#[command(
    name = "tasmosim-device",
    about = "Simulated Tasmota smart plug with MQTT messaging and a firmware-compatible HTTP API"
)]
struct Args {
    /// Device identifier, e.g. plug-001
    #[arg(long, env = "DEVICE_ID")]
    device_id: String,

    /// Human-readable device name; also drives profile inference
    #[arg(long, env = "DEVICE_NAME")]
    device_name: Option<String>,

    /// IP address reported in status messages
    #[arg(long, env = "DEVICE_IP", default_value = "127.0.0.1")]
    ip_address: String,

    /// Broker hostname
    #[arg(long, env = "BROKER_HOST", default_value = "localhost")]
    broker_host: String,

    /// Broker port
    #[arg(long, env = "BROKER_PORT", default_value_t = 1883)]
    broker_port: u16,

    /// Broker username
    #[arg(long, env = "BROKER_USERNAME")]
    broker_username: Option<String>,

    /// Broker password
    #[arg(long, env = "BROKER_PASSWORD")]
    broker_password: Option<String>,

    /// Power profile to pin, by catalog name (e.g. "Kettle")
    #[arg(long, env = "POWER_PROFILE")]
    profile: Option<String>,

    /// Category restriction for random profile assignment
    #[arg(long, env = "POWER_CATEGORY")]
    category: Option<String>,

    /// HTTP listen port
    #[arg(long, env = "HTTP_PORT", default_value_t = 8080)]
    http_port: u16,

    /// HTTP Basic auth username
    #[arg(long, env = "DEFAULT_USERNAME", default_value = "admin")]
    http_username: String,

    /// HTTP Basic auth password
    #[arg(long, env = "DEFAULT_PASSWORD", default_value = "test1234!")]
    http_password: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let category = match args.category.as_deref() {
        None => None,
        Some(name) => match DeviceCategory::from_name(name) {
            Some(category) => Some(category),
            None => {
                tracing::error!(category = name, "Unknown power category");
                return ExitCode::FAILURE;
            }
        },
    };

    let device_name = args
        .device_name
        .clone()
        .unwrap_or_else(|| args.device_id.clone());

    let mut config = DeviceConfig::builder(&args.device_id)
        .device_name(&device_name)
        .ip_address(&args.ip_address)
        .broker(&args.broker_host, args.broker_port);
    if let (Some(username), Some(password)) = (&args.broker_username, &args.broker_password) {
        config = config.broker_credentials(username, password);
    }
    if let Some(profile) = &args.profile {
        if let Err(e) = catalog::by_name_required(profile) {
            tracing::error!(error = %e, "Unknown power profile");
            return ExitCode::FAILURE;
        }
        config = config.profile_name(profile);
    }
    if let Some(category) = category {
        config = config.category(category);
    }

    let registry = PowerRegistry::new();
    let mut runtime = DeviceRuntime::new(config.build(), registry.clone());

    tracing::info!(
        device_id = %args.device_id,
        device_name = %device_name,
        ip_address = %args.ip_address,
        "Starting device simulator"
    );
    if let Err(e) = runtime.start().await {
        tracing::error!(error = %e, "Failed to start device runtime");
        return ExitCode::FAILURE;
    }

    let http_state = AppState::new(
        HttpConfig {
            device_id: args.device_id.clone(),
            device_name,
            ip_address: args.ip_address.clone(),
            username: args.http_username.clone(),
            password: args.http_password.clone(),
        },
        registry,
    );
    let addr = SocketAddr::from(([0, 0, 0, 0], args.http_port));

    let exit = tokio::select! {
        result = http::serve(addr, http_state) => {
            match result {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!(error = %e, "HTTP server failed");
                    ExitCode::FAILURE
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            ExitCode::SUCCESS
        }
    };

    runtime.stop().await;
    exit
}
