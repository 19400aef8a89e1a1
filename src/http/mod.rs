// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP control surface.
//!
//! One simulated device exposes one firmware-compatible web endpoint:
//! device overview on `/` and `/status`, live energy readings on
//! `/energy`, the assigned profile on `/power-profile`, relay control on
//! `/power/{state}` and the text-command API on `/cm?cmnd=`. Everything
//! except `/` requires HTTP Basic credentials, compared in constant time.
//!
//! The handlers read and mutate the same [`PowerRegistry`] the device
//! runtime publishes from, so HTTP and broker consumers observe one
//! consistent device.

pub mod command;
pub mod status;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Local};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ValueError;
use crate::message::EnergyData;
use crate::state::PowerRegistry;

use command::{Command, PowerAction};
use status::StatusContext;

/// Static configuration for one device's web endpoint.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Device identifier.
    pub device_id: String,
    /// Human-readable device name.
    pub device_name: String,
    /// IP address reported in status documents.
    pub ip_address: String,
    /// Basic auth username.
    pub username: String,
    /// Basic auth password.
    pub password: String,
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    config: Arc<HttpConfig>,
    registry: PowerRegistry,
    started_at: DateTime<Local>,
}

impl AppState {
    /// Creates the handler state; `started_at` is captured now.
    #[must_use]
    pub fn new(config: HttpConfig, registry: PowerRegistry) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            started_at: Local::now(),
        }
    }
}

/// Builds the device router with auth applied to everything but `/`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/status", get(device_status))
        .route("/energy", get(energy))
        .route("/power-profile", get(power_profile))
        .route("/power/{state}", post(set_power))
        .route("/cm", get(text_command))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_basic_auth,
        ))
        .with_state(state)
}

/// Binds and serves the router until the server future is dropped.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, device_id = %state.config.device_id, "HTTP surface listening");
    axum::serve(listener, build_router(state)).await
}

/// 400-style error carrying a `detail` body.
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }
}

impl From<ValueError> for ApiError {
    fn from(err: ValueError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

async fn require_basic_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    // The overview endpoint stays open, like the firmware's landing page.
    if request.uri().path() == "/" {
        return next.run(request).await;
    }

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| check_credentials(value, &state.config));

    if authorized {
        next.run(request).await
    } else {
        tracing::debug!(path = request.uri().path(), "Rejected unauthorized request");
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"tasmosim\"")],
            Json(json!({ "detail": "invalid credentials" })),
        )
            .into_response()
    }
}

/// Validates a `Basic` authorization header value.
fn check_credentials(header_value: &str, config: &HttpConfig) -> bool {
    let Some(encoded) = header_value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = BASE64.decode(encoded.trim()) else {
        return false;
    };
    let Ok(pair) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((username, password)) = pair.split_once(':') else {
        return false;
    };
    // Compare both parts unconditionally to keep timing uniform.
    let user_ok = constant_time_eq(username.as_bytes(), config.username.as_bytes());
    let pass_ok = constant_time_eq(password.as_bytes(), config.password.as_bytes());
    user_ok & pass_ok
}

/// Byte comparison without data-dependent early exit.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(device_overview(&state))
}

async fn device_status(State(state): State<AppState>) -> Json<Value> {
    Json(device_overview(&state))
}

fn device_overview(state: &AppState) -> Value {
    let info = state.registry.device_info(&state.config.device_id);
    let ctx = StatusContext {
        device_id: &state.config.device_id,
        device_name: &state.config.device_name,
        ip_address: &state.config.ip_address,
        info: &info,
        started_at: state.started_at,
        now: Local::now(),
    };
    json!({
        "Device": state.config.device_name,
        "Version": "1.0.0",
        "IPAddress": state.config.ip_address,
        "Status": "Online",
        "device_id": info.device_id,
        "device_name": state.config.device_name,
        "power_state": info.power_state,
        "energy_consumption": info.current_watts,
        "total_energy": info.total_energy_kwh,
        "profile_name": info.profile_name,
        "profile_category": info.profile_category,
        "voltage": ctx.voltage(),
        "current": ctx.current(),
    })
}

async fn energy(State(state): State<AppState>) -> Json<EnergyData> {
    let info = state.registry.device_info(&state.config.device_id);
    let ctx = StatusContext {
        device_id: &state.config.device_id,
        device_name: &state.config.device_name,
        ip_address: &state.config.ip_address,
        info: &info,
        started_at: state.started_at,
        now: Local::now(),
    };
    Json(EnergyData {
        power: info.current_watts,
        apparent_power: info.current_watts * 1.05,
        reactive_power: info.current_watts * 0.1,
        factor: 0.95,
        voltage: ctx.voltage(),
        current: ctx.current(),
        total: info.total_energy_kwh,
        today: info.total_energy_kwh * 0.1,
        yesterday: info.total_energy_kwh * 0.08,
    })
}

async fn power_profile(State(state): State<AppState>) -> Json<Value> {
    let info = state.registry.device_info(&state.config.device_id);
    Json(json!(info))
}

async fn set_power(
    State(state): State<AppState>,
    Path(power): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let new_state = match power.to_ascii_lowercase().as_str() {
        "on" => apply_power(&state, Some(true)),
        "off" => apply_power(&state, Some(false)),
        "toggle" => apply_power(&state, None),
        other => {
            return Err(ApiError::bad_request(format!(
                "invalid power state '{other}', use 'on', 'off' or 'toggle'"
            )));
        }
    };
    tracing::info!(
        device_id = %state.config.device_id,
        power_state = new_state,
        "Power state set over HTTP"
    );
    Ok(Json(json!({
        "power_state": new_state,
        "message": format!("Power turned {}", if new_state { "on" } else { "off" }),
    })))
}

/// Applies an absolute state or, with `None`, a toggle. The read of the
/// old state and the write of the new one happen under one lock.
fn apply_power(state: &AppState, target: Option<bool>) -> bool {
    let entry = state.registry.entry(&state.config.device_id);
    let mut device = entry.lock();
    let new_state = target.unwrap_or(!device.power_state());
    device.set_power_state(new_state, Local::now());
    new_state
}

#[derive(Debug, Deserialize)]
struct CommandQuery {
    cmnd: String,
}

async fn text_command(
    State(state): State<AppState>,
    Query(query): Query<CommandQuery>,
) -> Result<Json<Value>, ApiError> {
    match command::parse(&query.cmnd)? {
        Command::Power(action) => {
            let power_state = match action {
                None => {
                    state
                        .registry
                        .device_info(&state.config.device_id)
                        .power_state
                }
                Some(PowerAction::On) => apply_power(&state, Some(true)),
                Some(PowerAction::Off) => apply_power(&state, Some(false)),
                Some(PowerAction::Toggle) => apply_power(&state, None),
            };
            Ok(Json(
                json!({ "POWER": if power_state { "ON" } else { "OFF" } }),
            ))
        }
        Command::Status(level) => {
            let info = state.registry.device_info(&state.config.device_id);
            let ctx = StatusContext {
                device_id: &state.config.device_id,
                device_name: &state.config.device_name,
                ip_address: &state.config.ip_address,
                info: &info,
                started_at: state.started_at,
                now: Local::now(),
            };
            Ok(Json(status::render(level, &ctx)))
        }
    }
}
