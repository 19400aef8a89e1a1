// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Process-wide registry of device power states.
//!
//! One [`PowerRegistry`] is shared between a device runtime and its HTTP
//! control surface, so both report the same device reality. Each device
//! entry sits behind its own mutex: the telemetry publisher and an HTTP
//! handler serialize on that mutex, while different devices never contend.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Local;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::profile::{DeviceCategory, PowerProfile, catalog, inference};

use super::DevicePowerState;

/// Snapshot of one device's state and profile, taken atomically.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    /// Device identifier.
    pub device_id: String,
    /// Assigned profile name.
    pub profile_name: String,
    /// Assigned profile category.
    pub profile_category: DeviceCategory,
    /// Profile description.
    pub profile_description: String,
    /// Whether the device is switched on.
    pub power_state: bool,
    /// Current draw in watts.
    pub current_watts: f64,
    /// Accumulated energy in kWh.
    pub total_energy_kwh: f64,
    /// Standby draw in watts.
    pub standby_watts: f64,
    /// Minimum active draw in watts.
    pub min_watts: f64,
    /// Maximum active draw in watts.
    pub max_watts: f64,
    /// Whether the profile has a duty cycle.
    pub has_cycling: bool,
    /// Whether consumption varies by hour of day.
    pub time_dependent: bool,
    /// Whether consumption varies by season.
    pub seasonal_dependent: bool,
}

/// Shared map from device id to power state.
///
/// Cheaply cloneable; all clones see the same devices. Devices are created
/// on first reference and live for the process lifetime.
#[derive(Clone, Default)]
pub struct PowerRegistry {
    devices: Arc<RwLock<HashMap<String, Arc<Mutex<DevicePowerState>>>>>,
}

impl PowerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a profile to a device, creating its state on first call.
    ///
    /// Resolution order: explicit `profile_name` if it exists in the
    /// catalog, otherwise a keyword inference on `device_name`, otherwise
    /// a random pick within `category` (or the whole catalog).
    ///
    /// A device created here gets a historical meter reading preloaded
    /// (5-500 kWh) so a fresh fleet looks lived-in. Re-assigning swaps
    /// the profile in place: the relay state and the energy meter of an
    /// existing device are carried over, so a restarted runtime never
    /// rewinds what the HTTP surface has been serving.
    pub fn assign_profile(
        &self,
        device_id: &str,
        device_name: Option<&str>,
        profile_name: Option<&str>,
        category: Option<DeviceCategory>,
    ) -> PowerProfile {
        let mut rng = StdRng::from_entropy();
        let profile = resolve_profile(device_name, profile_name, category, &mut rng);

        let mut devices = self.devices.write();
        if let Some(entry) = devices.get(device_id) {
            entry.lock().set_profile(profile.clone());
        } else {
            let mut state = DevicePowerState::new(device_id, profile.clone());
            state.preload_energy(rng.gen_range(5.0..500.0));
            devices.insert(device_id.to_string(), Arc::new(Mutex::new(state)));
        }
        profile
    }

    /// Deterministic variant of [`Self::assign_profile`] for tests.
    pub fn assign_profile_seeded(
        &self,
        device_id: &str,
        profile_name: &str,
        seed: u64,
    ) -> PowerProfile {
        let profile = catalog::by_name(profile_name)
            .cloned()
            .unwrap_or_else(|| catalog::generic(DeviceCategory::AlwaysOn));
        let state = DevicePowerState::with_seed(device_id, profile.clone(), seed);
        self.insert(device_id, state);
        profile
    }

    fn insert(&self, device_id: &str, state: DevicePowerState) {
        self.devices
            .write()
            .insert(device_id.to_string(), Arc::new(Mutex::new(state)));
    }

    /// Returns the entry for a device, creating it with a random profile
    /// on first reference.
    #[must_use]
    pub fn entry(&self, device_id: &str) -> Arc<Mutex<DevicePowerState>> {
        if let Some(entry) = self.devices.read().get(device_id) {
            return Arc::clone(entry);
        }
        let mut devices = self.devices.write();
        // A racing caller may have created the entry in the meantime.
        Arc::clone(devices.entry(device_id.to_string()).or_insert_with(|| {
            let profile = resolve_profile(None, None, None, &mut StdRng::from_entropy());
            Arc::new(Mutex::new(DevicePowerState::new(device_id, profile)))
        }))
    }

    /// Whether a device is registered.
    #[must_use]
    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.read().contains_key(device_id)
    }

    /// All registered device ids.
    #[must_use]
    pub fn device_ids(&self) -> Vec<String> {
        self.devices.read().keys().cloned().collect()
    }

    /// Switches a device on or off; returns the recomputed draw in watts.
    pub fn set_power_state(&self, device_id: &str, on: bool) -> f64 {
        let entry = self.entry(device_id);
        let mut state = entry.lock();
        state.set_power_state(on, Local::now())
    }

    /// Recomputes and returns the current draw in watts.
    pub fn power_consumption(&self, device_id: &str) -> f64 {
        let entry = self.entry(device_id);
        let mut state = entry.lock();
        state.update_power_consumption(Local::now())
    }

    /// Recomputes consumption and returns the energy meter in kWh.
    pub fn total_energy(&self, device_id: &str) -> f64 {
        let entry = self.entry(device_id);
        let mut state = entry.lock();
        state.update_power_consumption(Local::now());
        state.total_energy_kwh()
    }

    /// Takes a consistent snapshot of a device under a single lock.
    ///
    /// The consumption is refreshed first, so power state, wattage and
    /// meter reading in the snapshot always belong together.
    pub fn device_info(&self, device_id: &str) -> DeviceInfo {
        let entry = self.entry(device_id);
        let mut state = entry.lock();
        state.update_power_consumption(Local::now());
        let profile = state.profile();
        DeviceInfo {
            device_id: state.device_id().to_string(),
            profile_name: profile.name.to_string(),
            profile_category: profile.category,
            profile_description: profile.description.to_string(),
            power_state: state.power_state(),
            current_watts: state.current_watts(),
            total_energy_kwh: state.total_energy_kwh(),
            standby_watts: profile.standby_watts,
            min_watts: profile.watts_min,
            max_watts: profile.watts_max,
            has_cycling: profile.cycle.is_some(),
            time_dependent: profile.time_of_day,
            seasonal_dependent: profile.seasonal,
        }
    }
}

impl std::fmt::Debug for PowerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerRegistry")
            .field("devices", &self.devices.read().len())
            .finish()
    }
}

fn resolve_profile<R: Rng + ?Sized>(
    device_name: Option<&str>,
    profile_name: Option<&str>,
    category: Option<DeviceCategory>,
    rng: &mut R,
) -> PowerProfile {
    if let Some(name) = profile_name
        && let Some(profile) = catalog::by_name(name)
    {
        return profile.clone();
    }
    if let Some(name) = device_name
        && let Some(rule) = inference::infer(name, inference::default_rules())
        && let Some(profile) = catalog::by_name(rule.profile)
    {
        return profile.clone();
    }
    catalog::random(category, rng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_by_explicit_profile_name() {
        let registry = PowerRegistry::new();
        let profile = registry.assign_profile("plug-1", None, Some("Kettle"), None);
        assert_eq!(profile.name, "Kettle");
        assert!(registry.contains("plug-1"));
    }

    #[test]
    fn assign_infers_from_device_name() {
        let registry = PowerRegistry::new();
        let profile = registry.assign_profile("plug-2", Some("kitchen-coffee-maker"), None, None);
        assert_eq!(profile.name, "Coffee Maker");
    }

    #[test]
    fn assign_falls_back_to_category() {
        let registry = PowerRegistry::new();
        let profile =
            registry.assign_profile("plug-3", None, None, Some(DeviceCategory::Lighting));
        assert_eq!(profile.category, DeviceCategory::Lighting);
    }

    #[test]
    fn new_device_starts_with_historical_meter() {
        let registry = PowerRegistry::new();
        registry.assign_profile("plug-9", None, Some("Kettle"), None);
        let info = registry.device_info("plug-9");
        assert!(info.total_energy_kwh >= 5.0);
        assert!(info.total_energy_kwh < 501.0);
    }

    #[test]
    fn reassign_keeps_meter_and_relay_state() {
        let registry = PowerRegistry::new();
        registry.assign_profile("plug-10", None, Some("Kettle"), None);
        let before = registry.device_info("plug-10");

        // A runtime restart runs the assignment again; the device must
        // come out with its meter and relay state intact.
        registry.assign_profile("plug-10", None, Some("Radiator"), None);
        let after = registry.device_info("plug-10");

        assert_eq!(after.profile_name, "Radiator");
        assert_eq!(after.power_state, before.power_state);
        assert!(
            after.total_energy_kwh >= before.total_energy_kwh,
            "meter went backwards: {} -> {}",
            before.total_energy_kwh,
            after.total_energy_kwh
        );
    }

    #[test]
    fn entry_creates_on_first_reference() {
        let registry = PowerRegistry::new();
        assert!(!registry.contains("plug-4"));
        let _ = registry.entry("plug-4");
        assert!(registry.contains("plug-4"));
    }

    #[test]
    fn toggle_twice_returns_to_original_state() {
        let registry = PowerRegistry::new();
        registry.assign_profile_seeded("plug-5", "LED Lamp", 21);
        let initial = registry.device_info("plug-5").power_state;
        registry.set_power_state("plug-5", !initial);
        registry.set_power_state("plug-5", initial);
        assert_eq!(registry.device_info("plug-5").power_state, initial);
    }

    #[test]
    fn snapshot_fields_belong_together() {
        let registry = PowerRegistry::new();
        registry.assign_profile_seeded("plug-6", "Radiator", 8);
        registry.set_power_state("plug-6", true);
        let info = registry.device_info("plug-6");
        assert!(info.power_state);
        assert!(info.current_watts >= 0.0);
        assert_eq!(info.profile_name, "Radiator");
        assert_eq!(info.profile_category, DeviceCategory::Heating);
        assert!(info.has_cycling);
    }

    #[test]
    fn clones_share_devices() {
        let registry = PowerRegistry::new();
        let clone = registry.clone();
        registry.assign_profile_seeded("plug-7", "Router", 1);
        assert!(clone.contains("plug-7"));
    }

    #[test]
    fn concurrent_reads_and_toggles_stay_consistent() {
        let registry = PowerRegistry::new();
        registry.assign_profile_seeded("plug-8", "LED TV", 2);

        let toggler = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    registry.set_power_state("plug-8", i % 2 == 0);
                }
            })
        };
        let mut last_energy = 0.0_f64;
        for _ in 0..200 {
            let info = registry.device_info("plug-8");
            assert!(info.current_watts >= 0.0);
            assert!(info.total_energy_kwh >= last_energy);
            last_energy = info.total_energy_kwh;
        }
        toggler.join().unwrap();
    }
}
