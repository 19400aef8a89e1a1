// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Simulated device runtime.
//!
//! A [`DeviceRuntime`] owns one broker connection and drives one simulated
//! plug: it publishes status every 30 seconds and telemetry every
//! 10 seconds, and consumes its command queue, dispatching each command
//! synchronously and in order. The power model itself lives in the shared
//! [`PowerRegistry`], so the HTTP control surface observes the same device
//! the runtime publishes.
//!
//! # Examples
//!
//! ```no_run
//! use tasmosim::device::{DeviceConfig, DeviceRuntime};
//! use tasmosim::state::PowerRegistry;
//!
//! # async fn example() -> Result<(), tasmosim::error::Error> {
//! let config = DeviceConfig::builder("plug-001")
//!     .device_name("kitchen-kettle")
//!     .ip_address("172.25.0.100")
//!     .broker("rabbitmq.local", 1883)
//!     .build();
//!
//! let registry = PowerRegistry::new();
//! let mut runtime = DeviceRuntime::new(config, registry);
//! runtime.start().await?;
//! // ...
//! runtime.stop().await;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use chrono::{DateTime, Local};
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::message::{CommandKind, CommandMessage, EnergyData, StatusResponse, TelemetryData};
use crate::messaging::{Messaging, RetryPolicy};
use crate::profile::DeviceCategory;
use crate::state::PowerRegistry;

/// Interval between periodic status publishes.
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// Interval between periodic telemetry publishes.
const TELEMETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Bound on waiting for a task to finish during shutdown.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of a device runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not started, or fully shut down.
    Stopped,
    /// Broker connection and queue setup in progress.
    Connecting,
    /// Publishers and the command consumer are active.
    Running,
    /// Shutdown in progress.
    Stopping,
}

impl RunState {
    /// Lowercase name used in errors and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Connecting => "connecting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

/// Immutable identity and connection parameters for one simulated device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Device identifier, e.g. `plug-001`.
    pub device_id: String,
    /// Human-readable device name; also drives profile inference.
    pub device_name: String,
    /// IP address reported in status messages.
    pub ip_address: String,
    /// Firmware version reported in status messages.
    pub firmware_version: String,
    /// Broker host.
    pub broker_host: String,
    /// Broker port.
    pub broker_port: u16,
    /// Broker credentials.
    pub broker_credentials: Option<(String, String)>,
    /// Explicit profile name; overrides inference when set.
    pub profile_name: Option<String>,
    /// Category restriction for random profile assignment.
    pub category: Option<DeviceCategory>,
    /// Connection retry policy.
    pub retry: RetryPolicy,
}

impl DeviceConfig {
    /// Creates a builder for the given device id.
    #[must_use]
    pub fn builder(device_id: impl Into<String>) -> DeviceConfigBuilder {
        DeviceConfigBuilder {
            device_id: device_id.into(),
            device_name: None,
            ip_address: None,
            firmware_version: None,
            broker_host: None,
            broker_port: None,
            broker_credentials: None,
            profile_name: None,
            category: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Builder for [`DeviceConfig`].
#[derive(Debug)]
pub struct DeviceConfigBuilder {
    device_id: String,
    device_name: Option<String>,
    ip_address: Option<String>,
    firmware_version: Option<String>,
    broker_host: Option<String>,
    broker_port: Option<u16>,
    broker_credentials: Option<(String, String)>,
    profile_name: Option<String>,
    category: Option<DeviceCategory>,
    retry: RetryPolicy,
}

impl DeviceConfigBuilder {
    /// Sets the device name (default: the device id).
    #[must_use]
    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    /// Sets the reported IP address (default: `127.0.0.1`).
    #[must_use]
    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    /// Sets the reported firmware version (default: `12.5.0`).
    #[must_use]
    pub fn firmware_version(mut self, version: impl Into<String>) -> Self {
        self.firmware_version = Some(version.into());
        self
    }

    /// Sets the broker address (default: `localhost:1883`).
    #[must_use]
    pub fn broker(mut self, host: impl Into<String>, port: u16) -> Self {
        self.broker_host = Some(host.into());
        self.broker_port = Some(port);
        self
    }

    /// Sets broker credentials.
    #[must_use]
    pub fn broker_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.broker_credentials = Some((username.into(), password.into()));
        self
    }

    /// Pins the power profile by catalog name.
    #[must_use]
    pub fn profile_name(mut self, name: impl Into<String>) -> Self {
        self.profile_name = Some(name.into());
        self
    }

    /// Restricts random profile assignment to one category.
    #[must_use]
    pub fn category(mut self, category: DeviceCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Sets the connection retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builds the config, filling unset fields with defaults.
    #[must_use]
    pub fn build(self) -> DeviceConfig {
        let device_name = self.device_name.unwrap_or_else(|| self.device_id.clone());
        DeviceConfig {
            device_id: self.device_id,
            device_name,
            ip_address: self.ip_address.unwrap_or_else(|| "127.0.0.1".to_string()),
            firmware_version: self.firmware_version.unwrap_or_else(|| "12.5.0".to_string()),
            broker_host: self.broker_host.unwrap_or_else(|| "localhost".to_string()),
            broker_port: self.broker_port.unwrap_or(1883),
            broker_credentials: self.broker_credentials,
            profile_name: self.profile_name,
            category: self.category,
            retry: self.retry,
        }
    }
}

/// One simulated device: broker connection, publishers, command consumer.
pub struct DeviceRuntime {
    config: DeviceConfig,
    registry: PowerRegistry,
    messaging: Messaging,
    run_state: RunState,
    started_at: Option<DateTime<Local>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl DeviceRuntime {
    /// Creates a runtime from config. No connection is made until
    /// [`Self::start`].
    #[must_use]
    pub fn new(config: DeviceConfig, registry: PowerRegistry) -> Self {
        let mut builder = Messaging::builder()
            .host(config.broker_host.clone())
            .port(config.broker_port)
            .client_id(format!("device_{}", config.device_id))
            .retry(config.retry.clone());
        if let Some((ref username, ref password)) = config.broker_credentials {
            builder = builder.credentials(username.clone(), password.clone());
        }
        Self {
            config,
            registry,
            messaging: builder.build(),
            run_state: RunState::Stopped,
            started_at: None,
            shutdown_tx: None,
            tasks: Vec::new(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    /// The runtime's config.
    #[must_use]
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Connects to the broker, binds the command queue, assigns the power
    /// profile and launches the publisher and consumer tasks.
    ///
    /// On failure the runtime is left `Stopped`; the caller decides
    /// whether to retry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRunState`] if the runtime is not stopped,
    /// or a [`ProtocolError`](crate::error::ProtocolError) when the broker
    /// connection or queue setup fails.
    pub async fn start(&mut self) -> Result<(), Error> {
        if self.run_state != RunState::Stopped {
            return Err(Error::InvalidRunState(self.run_state.as_str()));
        }
        self.run_state = RunState::Connecting;
        tracing::info!(device_id = %self.config.device_id, "Starting device runtime");

        if let Err(e) = self.messaging.connect().await {
            self.run_state = RunState::Stopped;
            return Err(Error::Protocol(e));
        }
        let commands = match self.messaging.setup_device_queue(&self.config.device_id).await {
            Ok(rx) => rx,
            Err(e) => {
                self.messaging.close().await;
                self.run_state = RunState::Stopped;
                return Err(Error::Protocol(e));
            }
        };

        let profile = self.registry.assign_profile(
            &self.config.device_id,
            Some(self.config.device_name.as_str()),
            self.config.profile_name.as_deref(),
            self.config.category,
        );
        tracing::info!(
            device_id = %self.config.device_id,
            profile = profile.name,
            category = profile.category.as_str(),
            "Assigned power profile"
        );

        let started_at = Local::now();
        self.started_at = Some(started_at);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        let worker = Worker {
            config: self.config.clone(),
            registry: self.registry.clone(),
            messaging: self.messaging.clone(),
            started_at,
        };

        self.tasks.push(tokio::spawn(
            worker.clone().status_loop(shutdown_rx.clone()),
        ));
        self.tasks.push(tokio::spawn(
            worker.clone().telemetry_loop(shutdown_rx.clone()),
        ));
        self.tasks
            .push(tokio::spawn(worker.command_loop(commands, shutdown_rx)));

        self.run_state = RunState::Running;
        tracing::info!(device_id = %self.config.device_id, "Device runtime running");
        Ok(())
    }

    /// Stops the runtime: signals all tasks, waits for each with a
    /// bounded timeout (aborting stragglers) and closes the broker
    /// connection.
    ///
    /// Idempotent; stopping a stopped runtime is a no-op.
    pub async fn stop(&mut self) {
        if self.run_state == RunState::Stopped {
            return;
        }
        self.run_state = RunState::Stopping;
        tracing::info!(device_id = %self.config.device_id, "Stopping device runtime");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        for task in self.tasks.drain(..) {
            let abort = task.abort_handle();
            if tokio::time::timeout(JOIN_TIMEOUT, task).await.is_err() {
                tracing::warn!(
                    device_id = %self.config.device_id,
                    "Task did not stop in time, aborting"
                );
                abort.abort();
            }
        }

        self.messaging.close().await;
        self.started_at = None;
        self.run_state = RunState::Stopped;
        tracing::info!(device_id = %self.config.device_id, "Device runtime stopped");
    }
}

/// Shared context cloned into each runtime task.
#[derive(Clone)]
struct Worker {
    config: DeviceConfig,
    registry: PowerRegistry,
    messaging: Messaging,
    started_at: DateTime<Local>,
}

impl Worker {
    async fn status_loop(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(STATUS_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.publish_status().await,
                _ = shutdown.changed() => break,
            }
        }
        tracing::debug!(device_id = %self.config.device_id, "Status publisher stopped");
    }

    async fn telemetry_loop(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(TELEMETRY_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.publish_telemetry().await,
                _ = shutdown.changed() => break,
            }
        }
        tracing::debug!(device_id = %self.config.device_id, "Telemetry publisher stopped");
    }

    async fn command_loop(
        self,
        mut commands: tokio::sync::mpsc::Receiver<CommandMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                message = commands.recv() => match message {
                    Some(command) => self.dispatch(command).await,
                    None => {
                        tracing::debug!(
                            device_id = %self.config.device_id,
                            "Command queue closed"
                        );
                        break;
                    }
                },
                _ = shutdown.changed() => break,
            }
        }
        tracing::debug!(device_id = %self.config.device_id, "Command consumer stopped");
    }

    /// Dispatches one command synchronously. The next command is not
    /// consumed until this one (including its reply publish) completes.
    async fn dispatch(&self, command: CommandMessage) {
        tracing::info!(
            device_id = %self.config.device_id,
            command = %command.command,
            "Received command"
        );
        match command.kind() {
            Some(CommandKind::PowerOn) => {
                self.registry.set_power_state(&self.config.device_id, true);
                self.publish_status().await;
            }
            Some(CommandKind::PowerOff) => {
                self.registry.set_power_state(&self.config.device_id, false);
                self.publish_status().await;
            }
            Some(CommandKind::Status) => self.publish_status().await,
            Some(CommandKind::Energy) => self.publish_telemetry().await,
            None => {
                tracing::warn!(
                    device_id = %self.config.device_id,
                    command = %command.command,
                    "Ignoring unknown command"
                );
            }
        }
    }

    async fn publish_status(&self) {
        let status = build_status(
            &self.config,
            &self.registry,
            self.started_at,
            &mut rand::thread_rng(),
        );
        if let Err(e) = self
            .messaging
            .publish_status(&self.config.device_id, &status)
            .await
        {
            tracing::warn!(
                device_id = %self.config.device_id,
                error = %e,
                "Failed to publish status"
            );
        }
    }

    async fn publish_telemetry(&self) {
        let telemetry = build_telemetry(
            &self.config.device_id,
            &self.registry,
            self.started_at,
            &mut rand::thread_rng(),
        );
        if let Err(e) = self
            .messaging
            .publish_telemetry(&self.config.device_id, &telemetry)
            .await
        {
            tracing::warn!(
                device_id = %self.config.device_id,
                error = %e,
                "Failed to publish telemetry"
            );
        }
    }
}

/// Builds a status snapshot from the live power model.
fn build_status<R: Rng + ?Sized>(
    config: &DeviceConfig,
    registry: &PowerRegistry,
    started_at: DateTime<Local>,
    rng: &mut R,
) -> StatusResponse {
    let info = registry.device_info(&config.device_id);
    StatusResponse {
        device_id: config.device_id.clone(),
        device_name: config.device_name.clone(),
        ip_address: config.ip_address.clone(),
        power_state: info.power_state,
        energy_consumption: info.current_watts,
        total_energy: info.total_energy_kwh,
        firmware_version: config.firmware_version.clone(),
        uptime: uptime_seconds(started_at, Local::now()),
        wifi_signal: rng.gen_range(-60..=-30),
    }
}

/// Builds a telemetry message from the live power model.
fn build_telemetry<R: Rng + ?Sized>(
    device_id: &str,
    registry: &PowerRegistry,
    started_at: DateTime<Local>,
    rng: &mut R,
) -> TelemetryData {
    let info = registry.device_info(device_id);
    let now = Local::now();
    let energy = derive_energy(info.current_watts, info.total_energy_kwh, rng);
    TelemetryData {
        device_id: device_id.to_string(),
        power_state: info.power_state,
        energy: EnergyData {
            // Energy since start counts toward today only until midnight.
            today: if now.date_naive() == started_at.date_naive() {
                info.total_energy_kwh
            } else {
                0.0
            },
            ..energy
        },
        timestamp: now.to_rfc3339(),
    }
}

/// Derives the electrical quantities firmware reports from active power.
fn derive_energy<R: Rng + ?Sized>(watts: f64, total_kwh: f64, rng: &mut R) -> EnergyData {
    let voltage = 230.0 + rng.gen_range(-5.0..=5.0);
    let current = if voltage > 0.0 { watts / voltage } else { 0.0 };
    EnergyData {
        power: watts,
        apparent_power: watts * 1.05,
        reactive_power: watts * 0.1,
        factor: rng.gen_range(0.85..0.95),
        voltage,
        current,
        total: total_kwh,
        today: total_kwh,
        yesterday: rng.gen_range(0.1..2.0),
    }
}

fn uptime_seconds(started_at: DateTime<Local>, now: DateTime<Local>) -> u64 {
    u64::try_from((now - started_at).num_seconds()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn test_config() -> DeviceConfig {
        DeviceConfig::builder("plug-001")
            .device_name("kitchen-kettle")
            .ip_address("172.25.0.100")
            .broker("localhost", 1883)
            .broker_credentials("admin", "admin")
            .build()
    }

    #[test]
    fn builder_applies_defaults() {
        let config = DeviceConfig::builder("plug-009").build();
        assert_eq!(config.device_name, "plug-009");
        assert_eq!(config.ip_address, "127.0.0.1");
        assert_eq!(config.firmware_version, "12.5.0");
        assert_eq!(config.broker_host, "localhost");
        assert_eq!(config.broker_port, 1883);
        assert!(config.broker_credentials.is_none());
    }

    #[test]
    fn status_reflects_power_model_and_bounds_wifi() {
        let registry = PowerRegistry::new();
        registry.assign_profile_seeded("plug-001", "Kettle", 7);
        registry.set_power_state("plug-001", true);

        let mut rng = StdRng::seed_from_u64(1);
        let started = Local::now() - ChronoDuration::seconds(90);
        for _ in 0..50 {
            let status = build_status(&test_config(), &registry, started, &mut rng);
            assert!(status.power_state);
            assert!(status.energy_consumption >= 0.0);
            assert!((-60..=-30).contains(&status.wifi_signal));
            assert!(status.uptime >= 90);
            assert_eq!(status.firmware_version, "12.5.0");
        }
    }

    #[test]
    fn telemetry_derivations_hold() {
        let registry = PowerRegistry::new();
        registry.assign_profile_seeded("plug-002", "Radiator", 3);
        registry.set_power_state("plug-002", true);

        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..50 {
            let telemetry = build_telemetry("plug-002", &registry, Local::now(), &mut rng);
            let e = &telemetry.energy;
            assert!((e.apparent_power - e.power * 1.05).abs() < 1e-9);
            assert!((e.reactive_power - e.power * 0.1).abs() < 1e-9);
            assert!((0.85..0.95).contains(&e.factor));
            assert!((225.0..=235.0).contains(&e.voltage));
            assert!((e.current - e.power / e.voltage).abs() < 1e-9);
            assert!((0.1..2.0).contains(&e.yesterday));
        }
    }

    #[test]
    fn telemetry_today_resets_across_midnight() {
        let registry = PowerRegistry::new();
        registry.assign_profile_seeded("plug-003", "Router", 4);
        let mut rng = StdRng::seed_from_u64(3);

        let yesterday_start = Local::now() - ChronoDuration::days(1);
        let telemetry = build_telemetry("plug-003", &registry, yesterday_start, &mut rng);
        assert!((telemetry.energy.today - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn uptime_never_negative() {
        let now = Local::now();
        assert_eq!(uptime_seconds(now + ChronoDuration::seconds(30), now), 0);
        assert_eq!(
            uptime_seconds(now - ChronoDuration::seconds(30), now),
            30
        );
    }

    #[tokio::test]
    async fn stop_before_start_is_noop() {
        let mut runtime = DeviceRuntime::new(test_config(), PowerRegistry::new());
        assert_eq!(runtime.run_state(), RunState::Stopped);
        runtime.stop().await;
        assert_eq!(runtime.run_state(), RunState::Stopped);
    }

    #[tokio::test]
    async fn start_fails_cleanly_without_broker() {
        let config = DeviceConfig::builder("plug-004")
            .broker("127.0.0.1", 1)
            .retry(RetryPolicy {
                max_attempts: 1,
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(10),
                multiplier: 1.5,
            })
            .build();
        let mut runtime = DeviceRuntime::new(config, PowerRegistry::new());
        assert!(runtime.start().await.is_err());
        assert_eq!(runtime.run_state(), RunState::Stopped);
    }
}
