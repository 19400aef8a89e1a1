// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The fixed catalog of power profiles.
//!
//! Profile names are unique across the catalog. Wattage figures follow
//! typical European household devices on a 230 V grid.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::ValueError;

use super::{Cycle, CyclePattern, DeviceCategory, PowerProfile};

const fn entry(
    category: DeviceCategory,
    name: &'static str,
    watts_min: f64,
    watts_max: f64,
    standby_watts: f64,
    variation: f64,
    cycle: Option<Cycle>,
    seasonal: bool,
    description: &'static str,
) -> PowerProfile {
    // Hour-of-day tables exist only for these three categories.
    let time_of_day = matches!(
        category,
        DeviceCategory::Lighting | DeviceCategory::ApplianceSmall | DeviceCategory::Electronics
    );
    PowerProfile {
        category,
        name,
        watts_min,
        watts_max,
        standby_watts,
        variation,
        cycle,
        time_of_day,
        seasonal,
        description,
    }
}

const fn duty(minutes: u32) -> Option<Cycle> {
    Some(Cycle {
        minutes,
        pattern: CyclePattern::DutyCycle,
    })
}

const fn compressor(minutes: u32) -> Option<Cycle> {
    Some(Cycle {
        minutes,
        pattern: CyclePattern::Compressor,
    })
}

/// The full profile catalog.
static CATALOG: &[PowerProfile] = &[
    // Lighting
    entry(DeviceCategory::Lighting, "LED Lamp", 8.0, 15.0, 0.2, 0.05, None, false,
        "Modern LED lighting"),
    entry(DeviceCategory::Lighting, "Halogen Lamp", 35.0, 50.0, 0.5, 0.03, None, false,
        "Traditional halogen lighting"),
    entry(DeviceCategory::Lighting, "Smart Lamp", 6.0, 18.0, 1.5, 0.15, None, false,
        "Dimmable smart LED lamp"),
    // Heating
    entry(DeviceCategory::Heating, "Fan Heater", 1200.0, 2000.0, 2.0, 0.2, duty(15), true,
        "Electric fan heater"),
    entry(DeviceCategory::Heating, "Radiator", 800.0, 1500.0, 1.5, 0.25, duty(20), true,
        "Electric oil radiator"),
    entry(DeviceCategory::Heating, "Infrared Panel", 600.0, 1200.0, 1.0, 0.15, duty(25), true,
        "Infrared heating panel"),
    // Small appliances
    entry(DeviceCategory::ApplianceSmall, "Coffee Maker", 800.0, 1200.0, 2.5, 0.3, None, false,
        "Drip coffee maker"),
    entry(DeviceCategory::ApplianceSmall, "Kettle", 1800.0, 2200.0, 0.8, 0.1, None, false,
        "Electric kettle"),
    entry(DeviceCategory::ApplianceSmall, "Toaster", 800.0, 1400.0, 1.2, 0.2, None, false,
        "Two-slice toaster"),
    // Large appliances
    entry(DeviceCategory::ApplianceLarge, "Microwave", 1000.0, 1500.0, 3.0, 0.2, None, false,
        "Microwave oven"),
    entry(DeviceCategory::ApplianceLarge, "Refrigerator", 120.0, 200.0, 5.0, 0.3, compressor(45), false,
        "Fridge-freezer combination"),
    entry(DeviceCategory::ApplianceLarge, "Dishwasher", 1800.0, 2200.0, 4.0, 0.4, None, false,
        "Built-in dishwasher"),
    // Electronics
    entry(DeviceCategory::Electronics, "LED TV", 80.0, 150.0, 0.8, 0.2, None, false,
        "55 inch LED television"),
    entry(DeviceCategory::Electronics, "Desktop Computer", 200.0, 400.0, 8.0, 0.4, None, false,
        "Desktop PC with monitor"),
    entry(DeviceCategory::Electronics, "Router", 8.0, 15.0, 8.0, 0.1, None, false,
        "Wireless router"),
    // Motors
    entry(DeviceCategory::Motor, "Washing Machine", 1800.0, 2500.0, 2.5, 0.5, None, false,
        "Front-loading washing machine"),
    entry(DeviceCategory::Motor, "Vacuum Cleaner", 1200.0, 1800.0, 1.0, 0.3, None, false,
        "Canister vacuum cleaner"),
    entry(DeviceCategory::Motor, "Ceiling Fan", 25.0, 75.0, 0.5, 0.2, None, true,
        "Ceiling fan"),
    // Always on
    entry(DeviceCategory::AlwaysOn, "Security Camera", 3.0, 8.0, 3.0, 0.1, None, false,
        "IP security camera"),
    entry(DeviceCategory::AlwaysOn, "Smart Hub", 2.0, 5.0, 2.0, 0.05, None, false,
        "Smart home hub"),
];

/// Returns every profile in the catalog.
#[must_use]
pub fn all() -> &'static [PowerProfile] {
    CATALOG
}

/// Looks up a profile by name, case-insensitively.
#[must_use]
pub fn by_name(name: &str) -> Option<&'static PowerProfile> {
    CATALOG.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

/// Looks up a profile by name, failing on names the catalog does not
/// carry. Use this where a typo must surface instead of silently
/// falling back to inference.
pub fn by_name_required(name: &str) -> Result<&'static PowerProfile, ValueError> {
    by_name(name).ok_or_else(|| ValueError::UnknownProfile(name.to_string()))
}

/// Returns all profiles in the given category.
pub fn in_category(category: DeviceCategory) -> impl Iterator<Item = &'static PowerProfile> {
    CATALOG.iter().filter(move |p| p.category == category)
}

/// Picks a random profile, optionally restricted to a category.
///
/// Falls back to [`generic`] if the category holds no profiles.
pub fn random<R: Rng + ?Sized>(category: Option<DeviceCategory>, rng: &mut R) -> PowerProfile {
    match category {
        Some(cat) => {
            let candidates: Vec<_> = in_category(cat).collect();
            candidates
                .choose(rng)
                .map_or_else(|| generic(cat), |p| (*p).clone())
        }
        None => CATALOG
            .choose(rng)
            .cloned()
            .unwrap_or_else(|| generic(DeviceCategory::AlwaysOn)),
    }
}

/// A conservative fallback profile for a category with no catalog entries.
#[must_use]
pub fn generic(category: DeviceCategory) -> PowerProfile {
    PowerProfile {
        category,
        name: "Generic Device",
        watts_min: 10.0,
        watts_max: 50.0,
        standby_watts: 1.0,
        variation: 0.1,
        cycle: None,
        time_of_day: false,
        seasonal: false,
        description: "Fallback profile",
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn catalog_names_are_unique() {
        for (i, a) in CATALOG.iter().enumerate() {
            for b in &CATALOG[i + 1..] {
                assert_ne!(a.name, b.name, "duplicate profile name {}", a.name);
            }
        }
    }

    #[test]
    fn catalog_ranges_are_sane() {
        for p in CATALOG {
            assert!(p.watts_min > 0.0, "{}", p.name);
            assert!(p.watts_max >= p.watts_min, "{}", p.name);
            assert!(p.standby_watts >= 0.0, "{}", p.name);
            assert!((0.0..=1.0).contains(&p.variation), "{}", p.name);
            if let Some(cycle) = p.cycle {
                assert!(cycle.minutes > 0, "{}", p.name);
            }
        }
    }

    #[test]
    fn by_name_is_case_insensitive() {
        assert!(by_name("refrigerator").is_some());
        assert!(by_name("REFRIGERATOR").is_some());
        assert!(by_name("no such device").is_none());
    }

    #[test]
    fn by_name_required_rejects_unknown_names() {
        assert_eq!(by_name_required("Kettle").unwrap().name, "Kettle");
        assert!(matches!(
            by_name_required("Flux Capacitor"),
            Err(ValueError::UnknownProfile(name)) if name == "Flux Capacitor"
        ));
    }

    #[test]
    fn every_category_has_profiles() {
        for cat in DeviceCategory::ALL {
            assert!(in_category(cat).count() > 0, "{cat}");
        }
    }

    #[test]
    fn random_respects_category() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let p = random(Some(DeviceCategory::Heating), &mut rng);
            assert_eq!(p.category, DeviceCategory::Heating);
        }
    }

    #[test]
    fn heating_profiles_cycle_and_follow_seasons() {
        for p in in_category(DeviceCategory::Heating) {
            assert!(p.seasonal);
            assert!(matches!(
                p.cycle,
                Some(Cycle {
                    pattern: CyclePattern::DutyCycle,
                    ..
                })
            ));
        }
    }
}
