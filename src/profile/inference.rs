// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device-name to profile inference.
//!
//! Maps a human-assigned device name like `kitchen-coffee-maker` to a
//! catalog profile by keyword matching. The rule list is ordered: the
//! first rule with a matching keyword wins. This is a convenience default
//! for fleets created without explicit profiles, not a contract — callers
//! can pass their own rule slice or assign profiles directly.

use super::DeviceCategory;

/// A single inference rule: if any keyword occurs in the lowercased device
/// name, the named catalog profile is assigned.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    /// Substrings matched against the lowercased device name.
    pub keywords: &'static [&'static str],
    /// Category the rule maps to.
    pub category: DeviceCategory,
    /// Catalog profile name the rule maps to.
    pub profile: &'static str,
}

/// The default rule list.
///
/// More specific rules come first; e.g. `heater fan` must hit the heating
/// rules before the generic `fan` rule assigns a motor profile.
#[must_use]
pub fn default_rules() -> &'static [Rule] {
    const RULES: &[Rule] = &[
        Rule {
            keywords: &["smart lamp", "smart bulb", "dimmer"],
            category: DeviceCategory::Lighting,
            profile: "Smart Lamp",
        },
        Rule {
            keywords: &["halogen"],
            category: DeviceCategory::Lighting,
            profile: "Halogen Lamp",
        },
        Rule {
            keywords: &["lamp", "light", "led", "bulb"],
            category: DeviceCategory::Lighting,
            profile: "LED Lamp",
        },
        Rule {
            keywords: &["heater fan", "fan heater"],
            category: DeviceCategory::Heating,
            profile: "Fan Heater",
        },
        Rule {
            keywords: &["infrared"],
            category: DeviceCategory::Heating,
            profile: "Infrared Panel",
        },
        Rule {
            keywords: &["heater", "heating", "radiator"],
            category: DeviceCategory::Heating,
            profile: "Radiator",
        },
        Rule {
            keywords: &["coffee", "espresso"],
            category: DeviceCategory::ApplianceSmall,
            profile: "Coffee Maker",
        },
        Rule {
            keywords: &["kettle"],
            category: DeviceCategory::ApplianceSmall,
            profile: "Kettle",
        },
        Rule {
            keywords: &["toaster"],
            category: DeviceCategory::ApplianceSmall,
            profile: "Toaster",
        },
        Rule {
            keywords: &["microwave"],
            category: DeviceCategory::ApplianceLarge,
            profile: "Microwave",
        },
        Rule {
            keywords: &["fridge", "refrigerator", "freezer"],
            category: DeviceCategory::ApplianceLarge,
            profile: "Refrigerator",
        },
        Rule {
            keywords: &["dishwasher"],
            category: DeviceCategory::ApplianceLarge,
            profile: "Dishwasher",
        },
        Rule {
            keywords: &["tv", "television"],
            category: DeviceCategory::Electronics,
            profile: "LED TV",
        },
        Rule {
            keywords: &["computer", "desktop", "pc"],
            category: DeviceCategory::Electronics,
            profile: "Desktop Computer",
        },
        Rule {
            keywords: &["router", "modem"],
            category: DeviceCategory::Electronics,
            profile: "Router",
        },
        Rule {
            keywords: &["washing", "washer"],
            category: DeviceCategory::Motor,
            profile: "Washing Machine",
        },
        Rule {
            keywords: &["vacuum"],
            category: DeviceCategory::Motor,
            profile: "Vacuum Cleaner",
        },
        Rule {
            keywords: &["fan", "ventilator"],
            category: DeviceCategory::Motor,
            profile: "Ceiling Fan",
        },
        Rule {
            keywords: &["camera", "cam"],
            category: DeviceCategory::AlwaysOn,
            profile: "Security Camera",
        },
        Rule {
            keywords: &["hub", "sensor", "bridge"],
            category: DeviceCategory::AlwaysOn,
            profile: "Smart Hub",
        },
    ];
    RULES
}

/// Infers a catalog profile name from a device name.
///
/// Returns the first rule whose keyword occurs in the lowercased device
/// name, or `None` when nothing matches (the caller then picks a random
/// profile).
#[must_use]
pub fn infer<'r>(device_name: &str, rules: &'r [Rule]) -> Option<&'r Rule> {
    let name = device_name.to_lowercase();
    rules
        .iter()
        .find(|rule| rule.keywords.iter().any(|kw| name.contains(kw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::catalog;

    #[test]
    fn infers_known_devices() {
        let rules = default_rules();
        assert_eq!(
            infer("kitchen-coffee-maker", rules).unwrap().profile,
            "Coffee Maker"
        );
        assert_eq!(
            infer("Living Room TV", rules).unwrap().profile,
            "LED TV"
        );
        assert_eq!(infer("garage-fridge-2", rules).unwrap().profile, "Refrigerator");
    }

    #[test]
    fn specific_rules_win_over_generic_ones() {
        let rules = default_rules();
        // "fan heater" must not fall through to the motor fan rule.
        assert_eq!(
            infer("bedroom fan heater", rules).unwrap().category,
            DeviceCategory::Heating
        );
        assert_eq!(
            infer("bedroom fan", rules).unwrap().category,
            DeviceCategory::Motor
        );
    }

    #[test]
    fn unknown_names_do_not_match() {
        assert!(infer("mystery-device-42", default_rules()).is_none());
    }

    #[test]
    fn every_rule_targets_a_catalog_profile() {
        for rule in default_rules() {
            let profile = catalog::by_name(rule.profile)
                .unwrap_or_else(|| panic!("rule targets missing profile {}", rule.profile));
            assert_eq!(profile.category, rule.category);
        }
    }

    #[test]
    fn inference_is_deterministic() {
        let rules = default_rules();
        let a = infer("office desktop pc", rules).unwrap().profile;
        let b = infer("office desktop pc", rules).unwrap().profile;
        assert_eq!(a, b);
    }
}
