// Static reference tables: cabin code maps, carrier overrides, amenities.
//
// Loaded once at startup (built-in defaults or a JSON file) and shared
// read-only behind `Arc` by every adapter and the aggregator.

use crate::error::ReferenceError;
use crate::schema::Cabin;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Source-specific fare/product code -> canonical cabin.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CabinCodeMap(HashMap<String, Cabin>);

impl CabinCodeMap {
    pub fn from_pairs(pairs: &[(&str, Cabin)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(code, cabin)| (code.to_string(), *cabin))
                .collect(),
        )
    }

    pub fn resolve(&self, code: &str) -> Option<Cabin> {
        self.0.get(code).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OverrideTrigger {
    /// Fires when the resolved cabin equals this one.
    Cabin(Cabin),
    /// Fires when the fare's booking class equals this letter.
    BookingClass(char),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CabinOverride {
    pub carrier: String,
    pub trigger: OverrideTrigger,
    pub target: Cabin,
}

impl CabinOverride {
    pub fn new(carrier: &str, trigger: OverrideTrigger, target: Cabin) -> Self {
        Self {
            carrier: carrier.to_string(),
            trigger,
            target,
        }
    }

    fn matches(&self, carrier: &str, cabin: Cabin, booking_class: Option<char>) -> bool {
        if self.carrier != carrier {
            return false;
        }
        match self.trigger {
            OverrideTrigger::Cabin(trigger) => trigger == cabin,
            OverrideTrigger::BookingClass(trigger) => booking_class == Some(trigger),
        }
    }
}

/// Carrier quirks keyed by (carrier, trigger). The first matching rule wins.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CabinOverrides(Vec<CabinOverride>);

impl CabinOverrides {
    pub fn new(rules: Vec<CabinOverride>) -> Self {
        Self(rules)
    }

    pub fn apply(&self, carrier: &str, cabin: Cabin, booking_class: Option<char>) -> Cabin {
        self.0
            .iter()
            .find(|rule| rule.matches(carrier, cabin, booking_class))
            .map_or(cabin, |rule| rule.target)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AirlineAmenity {
    pub airline_code: String,
    /// Aircraft name fragments that identify lie-flat equipped aircraft.
    pub pods_aircraft: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct AmenityTable(Vec<AirlineAmenity>);

impl AmenityTable {
    pub fn new(airlines: Vec<AirlineAmenity>) -> Self {
        Self(airlines)
    }

    /// `None` when the carrier is not listed at all.
    pub fn has_pods(&self, carrier: &str, aircraft_name: &str) -> Option<bool> {
        self.0
            .iter()
            .find(|airline| airline.airline_code == carrier)
            .map(|airline| {
                airline
                    .pods_aircraft
                    .iter()
                    .any(|fragment| aircraft_name.contains(fragment.as_str()))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AaTables {
    /// First letter of the extended fare code, award (saver) family.
    pub award_fare_codes: CabinCodeMap,
    /// First letter of the extended fare code, standard family.
    pub standard_fare_codes: CabinCodeMap,
    pub product_types: CabinCodeMap,
    pub overrides: CabinOverrides,
    /// Error numbers meaning "nothing to show" rather than a failure.
    pub benign_error_codes: Vec<i64>,
}

impl Default for AaTables {
    fn default() -> Self {
        Self {
            award_fare_codes: CabinCodeMap::from_pairs(&[
                ("Z", Cabin::First),
                ("U", Cabin::Business),
                ("T", Cabin::Economy),
                ("X", Cabin::Economy),
            ]),
            standard_fare_codes: CabinCodeMap::from_pairs(&[
                ("F", Cabin::First),
                ("J", Cabin::Business),
                ("W", Cabin::Economy),
                ("Y", Cabin::Economy),
            ]),
            product_types: CabinCodeMap::from_pairs(&[
                ("COACH", Cabin::Economy),
                ("PREMIUM_ECONOMY", Cabin::Economy),
                ("BUSINESS", Cabin::Business),
                ("FIRST", Cabin::First),
            ]),
            // JetBlue has no first class
            overrides: CabinOverrides::new(vec![CabinOverride::new(
                "B6",
                OverrideTrigger::Cabin(Cabin::First),
                Cabin::Business,
            )]),
            // 309: no itinerary in the requested window, 1100: historic date
            benign_error_codes: vec![309, 1100],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AeroplanTables {
    pub cabin_codes: CabinCodeMap,
    pub overrides: CabinOverrides,
    /// Error codes meaning "nothing to show" when no bound groups came back.
    pub benign_error_codes: Vec<i64>,
}

impl Default for AeroplanTables {
    fn default() -> Self {
        Self {
            cabin_codes: CabinCodeMap::from_pairs(&[
                ("eco", Cabin::Economy),
                ("ecoPremium", Cabin::Economy),
                ("business", Cabin::Business),
                ("first", Cabin::First),
            ]),
            // United sells domestic business as "first" under booking class I
            overrides: CabinOverrides::new(vec![CabinOverride::new(
                "UA",
                OverrideTrigger::BookingClass('I'),
                Cabin::Economy,
            )]),
            benign_error_codes: Vec::new(),
        }
    }
}

/// Every read-only table the engine consults. The amenity table starts
/// empty and only holds what the reference file supplies.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReferenceData {
    pub amenities: AmenityTable,
    pub aa: AaTables,
    pub aeroplan: AeroplanTables,
}

impl ReferenceData {
    /// Tables missing from `json` keep their built-in values.
    pub fn from_json_str(json: &str) -> Result<Self, ReferenceError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ReferenceError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}
