// Canonical flight and fare records shared by every source adapter.
//
// Field names here are the serialization contract with the UI and caching
// layers. Renaming or removing one is a breaking change for consumers.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin, destination and date of one logical search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightQuery {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
}

impl FlightQuery {
    pub fn new(origin: &str, destination: &str, departure_date: NaiveDate) -> Self {
        Self {
            origin: origin.to_string(),
            destination: destination.to_string(),
            departure_date,
        }
    }
}

impl fmt::Display for FlightQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} on {}",
            self.origin, self.destination, self.departure_date
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cabin {
    Economy,
    Business,
    First,
}

impl Cabin {
    /// Parses the canonical lowercase label. Anything else is not a cabin.
    pub fn from_label(label: &str) -> Option<Cabin> {
        match label {
            "economy" => Some(Cabin::Economy),
            "business" => Some(Cabin::Business),
            "first" => Some(Cabin::First),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Cabin::Economy => "economy",
            Cabin::Business => "business",
            Cabin::First => "first",
        }
    }
}

impl fmt::Display for Cabin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Amenity flags. `None` means no source has said anything either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Amenities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_pods: Option<bool>,
    #[serde(default, rename = "hasWiFi", skip_serializing_if = "Option::is_none")]
    pub has_wifi: Option<bool>,
}

impl Amenities {
    /// Fills every unknown field from `other`, leaving known values alone.
    pub fn fill_missing_from(&mut self, other: &Amenities) {
        if self.has_pods.is_none() {
            self.has_pods = other.has_pods;
        }
        if self.has_wifi.is_none() {
            self.has_wifi = other.has_wifi;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FareRecord {
    pub cabin: Cabin,
    pub miles_required: u32,
    pub cash_fee: f64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_class: Option<char>,
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_saver_fare: Option<bool>,
}

/// A fare as an adapter first extracts it, before its cabin is known to be valid.
#[derive(Debug, Clone, PartialEq)]
pub struct FareCandidate {
    pub cabin: Option<Cabin>,
    pub raw_code: String,
    pub miles_required: u32,
    pub cash_fee: f64,
    pub currency: String,
    pub booking_class: Option<char>,
    pub source_id: String,
    pub is_saver_fare: Option<bool>,
}

impl FareCandidate {
    pub fn into_fare(self, cabin: Cabin) -> FareRecord {
        FareRecord {
            cabin,
            miles_required: self.miles_required,
            cash_fee: self.cash_fee,
            currency: self.currency,
            booking_class: self.booking_class,
            source_id: self.source_id,
            is_saver_fare: self.is_saver_fare,
        }
    }
}

/// One non-stop flight on one date, with at most one fare per cabin.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightRecord {
    #[serde(with = "minute_format")]
    pub departure_date_time: NaiveDateTime,
    #[serde(with = "minute_format")]
    pub arrival_date_time: NaiveDateTime,
    pub origin: String,
    pub destination: String,
    pub flight_number: String,
    pub duration_minutes: u32,
    pub aircraft_name: String,
    #[serde(default)]
    pub amenities: Amenities,
    pub fares: Vec<FareRecord>,
}

impl FlightRecord {
    /// Carrier prefix of the flight number, e.g. `"AA"` for `"AA 100"`.
    pub fn carrier_code(&self) -> &str {
        self.flight_number
            .split_whitespace()
            .next()
            .unwrap_or_default()
    }

    pub fn fare_for(&self, cabin: Cabin) -> Option<&FareRecord> {
        self.fares.iter().find(|fare| fare.cabin == cabin)
    }
}

/// Builds the `"AA 100"` style merge key from its parts.
pub fn flight_number(carrier_code: &str, number: &str) -> String {
    format!("{} {}", carrier_code.trim(), number.trim())
}

// Local wall-clock time, minute precision, no offset.
mod minute_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M";

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}
