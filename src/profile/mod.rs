// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Power consumption profiles for simulated devices.
//!
//! A [`PowerProfile`] is an immutable template describing how a class of
//! device draws power: its active wattage range, standby draw, noise level,
//! and whether consumption depends on the hour of day, the season, or a
//! periodic duty cycle. Profiles come from a fixed [`catalog`] and are
//! looked up by name or picked within a [`DeviceCategory`].
//!
//! # Examples
//!
//! ```
//! use tasmosim::profile::{catalog, DeviceCategory};
//!
//! let profile = catalog::by_name("Refrigerator").unwrap();
//! assert_eq!(profile.category, DeviceCategory::ApplianceLarge);
//! assert!(profile.cycle.is_some());
//! ```

pub mod catalog;
pub mod inference;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Device categories with distinct power behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCategory {
    /// Lamps and other light sources.
    Lighting,
    /// Electric heaters and radiators.
    Heating,
    /// Small kitchen appliances (kettle, toaster, coffee maker).
    ApplianceSmall,
    /// Large household appliances (fridge, dishwasher, microwave).
    ApplianceLarge,
    /// Consumer electronics (TV, computer, router).
    Electronics,
    /// Motor-driven devices (washing machine, vacuum, fan).
    Motor,
    /// Devices that draw the same power around the clock.
    AlwaysOn,
}

impl DeviceCategory {
    /// All categories, in catalog order.
    pub const ALL: [Self; 7] = [
        Self::Lighting,
        Self::Heating,
        Self::ApplianceSmall,
        Self::ApplianceLarge,
        Self::Electronics,
        Self::Motor,
        Self::AlwaysOn,
    ];

    /// Returns the wire representation of the category.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lighting => "lighting",
            Self::Heating => "heating",
            Self::ApplianceSmall => "appliance_small",
            Self::ApplianceLarge => "appliance_large",
            Self::Electronics => "electronics",
            Self::Motor => "motor",
            Self::AlwaysOn => "always_on",
        }
    }

    /// Looks a category up by its wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shape of the periodic consumption curve for cycling devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePattern {
    /// Mostly-on duty cycle with short low-draw phases (heaters).
    DutyCycle,
    /// Hard on/off compressor pattern (refrigeration).
    Compressor,
    /// Smooth sinusoidal swing around the base draw.
    Smooth,
}

/// Periodic consumption cycle of a device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    /// Full cycle period in minutes.
    pub minutes: u32,
    /// Curve the cycle position is mapped through.
    pub pattern: CyclePattern,
}

/// Power consumption profile for a device class.
///
/// Profiles are immutable; a device holds a reference into the catalog and
/// never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerProfile {
    /// Category this profile belongs to.
    pub category: DeviceCategory,
    /// Human-readable profile name, unique within the catalog.
    pub name: &'static str,
    /// Minimum active power draw in watts.
    pub watts_min: f64,
    /// Maximum active power draw in watts.
    pub watts_max: f64,
    /// Standby draw in watts while switched off.
    pub standby_watts: f64,
    /// Fractional noise applied to the computed draw (0.0-1.0).
    pub variation: f64,
    /// Periodic duty cycle, if the device oscillates.
    pub cycle: Option<Cycle>,
    /// Whether consumption depends on the hour of day.
    pub time_of_day: bool,
    /// Whether consumption depends on the season.
    pub seasonal: bool,
    /// Short description shown on the HTTP surface.
    pub description: &'static str,
}

impl PowerProfile {
    /// Upper bound of the draw while switched off, noise included.
    #[must_use]
    pub fn standby_ceiling(&self) -> f64 {
        self.standby_watts * (1.0 + self.variation)
    }

    /// Upper bound of the draw while switched on, across all factors.
    ///
    /// Useful for range assertions; the largest time-of-day factor is 1.4
    /// and the largest seasonal factor is 1.5.
    #[must_use]
    pub fn active_ceiling(&self) -> f64 {
        let time = if self.time_of_day { 1.4 } else { 1.0 };
        let season = if self.seasonal { 1.5 } else { 1.0 };
        // DutyCycle peaks at 1.2, Compressor at 1.3, Smooth at 1.4.
        let cycle = 1.4;
        self.watts_max * time * season * cycle * (1.0 + self.variation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_wire_names() {
        assert_eq!(DeviceCategory::ApplianceSmall.as_str(), "appliance_small");
        assert_eq!(DeviceCategory::AlwaysOn.to_string(), "always_on");
    }

    #[test]
    fn category_serializes_snake_case() {
        let json = serde_json::to_string(&DeviceCategory::ApplianceLarge).unwrap();
        assert_eq!(json, "\"appliance_large\"");
    }

    #[test]
    fn active_ceiling_dominates_catalog_factors() {
        let profile = catalog::by_name("Fan Heater").unwrap();
        // Seasonal winter factor (1.5) and duty-cycle peak must stay under
        // the documented ceiling.
        assert!(profile.active_ceiling() >= profile.watts_max * 1.5);
    }
}
