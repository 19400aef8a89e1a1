// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-device power state and the consumption model.
//!
//! [`DevicePowerState`] is a stateful stochastic process: each call to
//! [`DevicePowerState::update_power_consumption`] recomputes the draw from
//! the profile, the wall clock (hour of day, month) and the elapsed time
//! since the previous update, then integrates the result into the energy
//! meter. Exact wattage is noisy by design; tests assert ranges and
//! invariants, not values.
//!
//! Invariants upheld here:
//! - `current_watts >= 0` after every update
//! - `total_energy_kwh` never decreases
//! - `cycle_position` stays in `[0, 1)`

mod registry;

pub use registry::{DeviceInfo, PowerRegistry};

use std::f64::consts::TAU;

use chrono::{DateTime, Datelike, Local, Timelike};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::profile::{CyclePattern, DeviceCategory, PowerProfile};

/// Mutable power state of one simulated device.
#[derive(Debug, Clone)]
pub struct DevicePowerState {
    device_id: String,
    profile: PowerProfile,
    power_state: bool,
    current_watts: f64,
    cycle_position: f64,
    total_energy_kwh: f64,
    last_update: DateTime<Local>,
    rng: StdRng,
}

impl DevicePowerState {
    /// Creates a device state with an entropy-seeded noise source.
    ///
    /// The initial power state is randomized so a freshly created fleet
    /// shows realistic variety.
    #[must_use]
    pub fn new(device_id: impl Into<String>, profile: PowerProfile) -> Self {
        Self::with_rng(device_id, profile, StdRng::from_entropy())
    }

    /// Creates a device state with a deterministic noise source.
    #[must_use]
    pub fn with_seed(device_id: impl Into<String>, profile: PowerProfile, seed: u64) -> Self {
        Self::with_rng(device_id, profile, StdRng::seed_from_u64(seed))
    }

    fn with_rng(device_id: impl Into<String>, profile: PowerProfile, mut rng: StdRng) -> Self {
        let power_state = rng.gen_bool(0.5);
        let current_watts = profile.standby_watts;
        Self {
            device_id: device_id.into(),
            profile,
            power_state,
            current_watts,
            cycle_position: 0.0,
            total_energy_kwh: 0.0,
            last_update: Local::now(),
            rng,
        }
    }

    /// The device identifier this state belongs to.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The assigned power profile.
    #[must_use]
    pub fn profile(&self) -> &PowerProfile {
        &self.profile
    }

    /// Whether the device is switched on.
    #[must_use]
    pub fn power_state(&self) -> bool {
        self.power_state
    }

    /// The most recently computed draw in watts.
    #[must_use]
    pub fn current_watts(&self) -> f64 {
        self.current_watts
    }

    /// Accumulated energy in kWh since creation.
    #[must_use]
    pub fn total_energy_kwh(&self) -> f64 {
        self.total_energy_kwh
    }

    /// Position within the duty cycle, in `[0, 1)`.
    #[must_use]
    pub fn cycle_position(&self) -> f64 {
        self.cycle_position
    }

    /// Preloads the energy meter with a historical reading.
    ///
    /// Only ever raises the meter, so the monotonicity invariant holds
    /// even if called after updates have run.
    pub fn preload_energy(&mut self, kwh: f64) {
        if kwh > self.total_energy_kwh {
            self.total_energy_kwh = kwh;
        }
    }

    /// Replaces the profile, keeping the relay state and energy meter.
    ///
    /// The cycle position restarts because cycle periods differ between
    /// profiles.
    pub fn set_profile(&mut self, profile: PowerProfile) {
        self.profile = profile;
        self.cycle_position = 0.0;
    }

    /// Switches the device on or off and recomputes consumption.
    ///
    /// Returns the new draw in watts. The energy meter is carried over
    /// unchanged across toggles.
    pub fn set_power_state(&mut self, on: bool, now: DateTime<Local>) -> f64 {
        self.power_state = on;
        self.update_power_consumption(now)
    }

    /// Recomputes the current draw and integrates it into the meter.
    ///
    /// Returns the new draw in watts.
    pub fn update_power_consumption(&mut self, now: DateTime<Local>) -> f64 {
        let elapsed_secs = elapsed_seconds(self.last_update, now);

        let watts = if self.power_state {
            let base = self
                .rng
                .gen_range(self.profile.watts_min..=self.profile.watts_max);
            let time = if self.profile.time_of_day {
                time_of_day_factor(self.profile.category, now.hour())
            } else {
                1.0
            };
            let season = if self.profile.seasonal {
                seasonal_factor(self.profile.category, now.month())
            } else {
                1.0
            };
            let cycle = self.cycle_factor(elapsed_secs / 60.0);
            self.add_variation(base * time * season * cycle)
        } else {
            self.add_variation(self.profile.standby_watts)
        };

        self.current_watts = watts.max(0.0);
        if elapsed_secs > 0.0 {
            // W * s -> kWh
            self.total_energy_kwh += self.current_watts * elapsed_secs / 3_600_000.0;
        }
        self.last_update = now;
        self.current_watts
    }

    /// Applies bounded symmetric noise of `variation * base` around `base`.
    fn add_variation(&mut self, base: f64) -> f64 {
        let range = base * self.profile.variation;
        if range <= 0.0 {
            return base.max(0.0);
        }
        (base + self.rng.gen_range(-range..=range)).max(0.0)
    }

    /// Advances the cycle position and maps it through the profile's curve.
    fn cycle_factor(&mut self, elapsed_minutes: f64) -> f64 {
        let Some(cycle) = self.profile.cycle else {
            return 1.0;
        };

        self.cycle_position =
            (self.cycle_position + elapsed_minutes / f64::from(cycle.minutes)).rem_euclid(1.0);
        let wave = (self.cycle_position * TAU).sin();

        match cycle.pattern {
            // On for ~70% of the cycle, minimal draw for the rest.
            CyclePattern::DutyCycle => {
                if wave > -0.3 {
                    1.0 + wave * 0.2
                } else {
                    0.1
                }
            }
            // Compressor running vs. only fans and lights.
            CyclePattern::Compressor => {
                if wave > 0.0 {
                    1.0 + wave * 0.3
                } else {
                    0.3
                }
            }
            CyclePattern::Smooth => (1.0 + wave * 0.4).max(0.2),
        }
    }
}

fn elapsed_seconds(from: DateTime<Local>, to: DateTime<Local>) -> f64 {
    // Clock steps backwards (NTP, DST) must not drain the meter.
    let millis = (to - from).num_milliseconds().max(0);
    #[allow(clippy::cast_precision_loss)]
    {
        millis as f64 / 1000.0
    }
}

/// Hour-of-day multiplier per category.
fn time_of_day_factor(category: DeviceCategory, hour: u32) -> f64 {
    match category {
        DeviceCategory::Lighting => match hour {
            6..=8 | 17..=23 => 1.2,
            0..=5 => 0.3,
            _ => 0.7,
        },
        DeviceCategory::ApplianceSmall => match hour {
            // Meal times.
            7 | 8 | 12 | 13 | 18 | 19 => 1.3,
            0..=6 => 0.2,
            _ => 1.0,
        },
        DeviceCategory::Electronics => match hour {
            18..=23 => 1.4,
            9..=17 => 1.1,
            0..=6 => 0.3,
            _ => 1.0,
        },
        _ => 1.0,
    }
}

/// Month multiplier per category.
///
/// Heating peaks in winter; fan-type motors run the inverse curve.
fn seasonal_factor(category: DeviceCategory, month: u32) -> f64 {
    match category {
        DeviceCategory::Heating => match month {
            12 | 1 | 2 => 1.5,
            3 | 11 => 1.2,
            6..=8 => 0.3,
            _ => 1.0,
        },
        DeviceCategory::Motor => match month {
            6..=8 => 1.4,
            5 | 9 => 1.1,
            _ => 0.6,
        },
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::profile::catalog;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    fn state(profile: &str, seed: u64) -> DevicePowerState {
        DevicePowerState::with_seed(
            "plug-001",
            catalog::by_name(profile).unwrap().clone(),
            seed,
        )
    }

    #[test]
    fn standby_draw_stays_within_ceiling() {
        for seed in 0..20 {
            let mut s = state("Smart Lamp", seed);
            s.set_power_state(false, Local::now());
            let watts = s.update_power_consumption(Local::now());
            assert!(watts >= 0.0);
            assert!(watts <= s.profile().standby_ceiling());
        }
    }

    #[test]
    fn active_draw_stays_within_ceiling() {
        for p in catalog::all() {
            let mut s = DevicePowerState::with_seed("plug-001", p.clone(), 42);
            s.set_power_state(true, Local::now());
            for _ in 0..50 {
                let watts = s.update_power_consumption(Local::now());
                assert!(watts >= 0.0, "{}", p.name);
                assert!(watts <= p.active_ceiling(), "{}", p.name);
            }
        }
    }

    #[test]
    fn energy_meter_is_monotone() {
        let mut s = state("Fan Heater", 3);
        let start = at(2024, 1, 15, 18);
        s.set_power_state(true, start);
        let mut previous = s.total_energy_kwh();
        for i in 1..=60 {
            s.update_power_consumption(start + Duration::seconds(i * 10));
            assert!(s.total_energy_kwh() >= previous);
            previous = s.total_energy_kwh();
        }
        assert!(previous > 0.0);
    }

    #[test]
    fn toggling_preserves_energy_and_changes_regime() {
        let mut s = state("Kettle", 9);
        let t0 = at(2024, 6, 1, 12);
        s.set_power_state(true, t0);
        s.update_power_consumption(t0 + Duration::seconds(30));
        let energy_before = s.total_energy_kwh();
        let active_watts = s.current_watts();
        assert!(active_watts > 100.0);

        let standby = s.set_power_state(false, t0 + Duration::seconds(60));
        assert!(s.total_energy_kwh() >= energy_before);
        assert!(standby <= s.profile().standby_ceiling());

        let active = s.set_power_state(true, t0 + Duration::seconds(90));
        assert!(active >= s.profile().watts_min * 0.1);
        assert!(s.total_energy_kwh() >= energy_before);
    }

    #[test]
    fn cycle_position_wraps() {
        let mut s = state("Refrigerator", 5);
        let start = at(2024, 3, 10, 10);
        s.set_power_state(true, start);
        // 45 minute cycle; step well past several full cycles.
        for i in 1..=40 {
            s.update_power_consumption(start + Duration::minutes(i * 7));
            let pos = s.cycle_position();
            assert!((0.0..1.0).contains(&pos), "position {pos}");
        }
    }

    #[test]
    fn backwards_clock_does_not_drain_meter() {
        let mut s = state("LED TV", 11);
        let t0 = at(2024, 2, 2, 20);
        s.set_power_state(true, t0);
        s.update_power_consumption(t0 + Duration::seconds(60));
        let energy = s.total_energy_kwh();
        s.update_power_consumption(t0 - Duration::seconds(120));
        assert!(s.total_energy_kwh() >= energy);
        assert!(s.current_watts() >= 0.0);
    }

    #[test]
    fn preload_only_raises_the_meter() {
        let mut s = state("Router", 1);
        s.preload_energy(120.5);
        assert!((s.total_energy_kwh() - 120.5).abs() < f64::EPSILON);
        s.preload_energy(5.0);
        assert!((s.total_energy_kwh() - 120.5).abs() < f64::EPSILON);
    }

    #[test]
    fn winter_heating_outdraws_summer() {
        // Averages over many samples so noise cannot flip the comparison.
        let sample = |month: u32, seed: u64| -> f64 {
            let mut s = state("Radiator", seed);
            let start = at(2024, month, 10, 10);
            s.set_power_state(true, start);
            let mut sum = 0.0;
            for i in 1..=200 {
                sum += s.update_power_consumption(start + Duration::seconds(i));
            }
            sum / 200.0
        };
        assert!(sample(1, 77) > sample(7, 77) * 2.0);
    }

    #[test]
    fn night_lighting_draws_less_than_evening() {
        let sample = |hour: u32| -> f64 {
            let mut s = state("Halogen Lamp", 13);
            let start = at(2024, 5, 10, hour);
            s.set_power_state(true, start);
            let mut sum = 0.0;
            for i in 1..=200 {
                sum += s.update_power_consumption(start + Duration::milliseconds(i));
            }
            sum / 200.0
        };
        assert!(sample(20) > sample(3) * 2.0);
    }
}
