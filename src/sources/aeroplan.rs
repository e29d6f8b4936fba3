// Aeroplan (Air Canada) air-bounds search adapter
use crate::adapter::{
    decode_json, is_requested_nonstop, parse_local_minute, PayloadStatus, SourceAdapter,
};
use crate::error::SourceError;
use crate::reducer::reduce_candidates;
use crate::reference::AeroplanTables;
use crate::schema::{flight_number, Amenities, FareCandidate, FlightQuery, FlightRecord};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

// Data structures for the air-bounds JSON response
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AeroplanResponse {
    pub data: Option<AeroplanData>,
    pub dictionaries: AeroplanDictionaries,
    pub errors: Vec<AeroplanError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AeroplanData {
    pub air_bound_groups: Vec<AirBoundGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirBoundGroup {
    pub bound_details: BoundDetails,
    #[serde(default)]
    pub air_bounds: Vec<AirBound>,
}

#[derive(Debug, Deserialize)]
pub struct BoundDetails {
    pub segments: Vec<BoundSegment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundSegment {
    pub flight_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirBound {
    pub availability_details: Vec<AvailabilityDetail>,
    pub prices: AirBoundPrices,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityDetail {
    pub cabin: String,
    pub booking_class: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirBoundPrices {
    pub miles_conversion: MilesConversion,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilesConversion {
    pub converted_miles: ConvertedMiles,
    pub remaining_non_converted: RemainingNonConverted,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedMiles {
    pub base: u32,
    /// In cents.
    pub total_taxes: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemainingNonConverted {
    pub currency_code: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AeroplanDictionaries {
    pub flight: HashMap<String, FlightLookup>,
    pub aircraft: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightLookup {
    pub marketing_airline_code: String,
    pub marketing_flight_number: String,
    pub departure: FlightEndpoint,
    pub arrival: FlightEndpoint,
    /// In seconds.
    pub duration: u32,
    pub aircraft_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightEndpoint {
    pub location_code: String,
    pub date_time: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AeroplanError {
    pub code: Option<String>,
    pub title: Option<String>,
    pub detail: Option<String>,
}

impl AeroplanResponse {
    /// Errors only fail the query when no bound groups came back with them.
    pub fn classify(self, benign_codes: &[i64]) -> PayloadStatus<(Vec<AirBoundGroup>, AeroplanDictionaries)> {
        let groups = self.data.map(|data| data.air_bound_groups).unwrap_or_default();
        if !groups.is_empty() {
            return PayloadStatus::Success((groups, self.dictionaries));
        }

        match self.errors.into_iter().next() {
            None => PayloadStatus::BenignEmpty,
            Some(error) => {
                let raw_code = error.code.unwrap_or_default();
                let numeric = raw_code.trim().parse::<i64>().ok();
                let code = numeric.unwrap_or_default();
                if numeric.is_some() && benign_codes.contains(&code) {
                    return PayloadStatus::BenignEmpty;
                }
                let mut message = match (error.title, error.detail) {
                    (Some(title), Some(detail)) => format!("{title}: {detail}"),
                    (Some(text), None) | (None, Some(text)) => text,
                    (None, None) => format!("error code {raw_code}"),
                };
                // Non-numeric codes are reported as 0, the raw code rides in the message
                if numeric.is_none() && !raw_code.is_empty() {
                    debug!(source = AeroplanAdapter::SOURCE_ID, %raw_code, "non-numeric error code");
                    if !message.contains(raw_code.as_str()) {
                        message = format!("{message} (code {raw_code})");
                    }
                }
                PayloadStatus::Fatal { code, message }
            }
        }
    }
}

pub struct AeroplanAdapter {
    tables: Arc<AeroplanTables>,
}

impl AeroplanAdapter {
    pub const SOURCE_ID: &'static str = "aeroplan";

    pub fn new(tables: Arc<AeroplanTables>) -> Self {
        Self { tables }
    }

    fn standardize_group(
        &self,
        query: &FlightQuery,
        group: AirBoundGroup,
        dictionaries: &AeroplanDictionaries,
    ) -> Result<Option<FlightRecord>, SourceError> {
        let flight_id = &group
            .bound_details
            .segments
            .first()
            .ok_or_else(|| SourceError::unparseable(Self::SOURCE_ID, "bound without segments"))?
            .flight_id;
        let lookup = dictionaries.flight.get(flight_id).ok_or_else(|| {
            SourceError::unparseable(Self::SOURCE_ID, format!("flight {flight_id} missing from dictionary"))
        })?;
        let carrier = lookup.marketing_airline_code.as_str();
        let flight_no = flight_number(carrier, &lookup.marketing_flight_number);

        if !is_requested_nonstop(
            query,
            group.bound_details.segments.len(),
            &lookup.departure.location_code,
            &lookup.arrival.location_code,
        ) {
            debug!(
                source = Self::SOURCE_ID,
                flight = %flight_no,
                segments = group.bound_details.segments.len(),
                "skipping itinerary"
            );
            return Ok(None);
        }

        let aircraft_name = dictionaries
            .aircraft
            .get(&lookup.aircraft_code)
            .cloned()
            .ok_or_else(|| SourceError::UnknownAircraft {
                flight_number: flight_no.clone(),
                code: lookup.aircraft_code.clone(),
            })?;

        let mut candidates = Vec::with_capacity(group.air_bounds.len());
        for bound in &group.air_bounds {
            let detail = bound.availability_details.first().ok_or_else(|| {
                SourceError::unparseable(Self::SOURCE_ID, format!("fare on {flight_no} without availability details"))
            })?;
            let booking_class = detail
                .booking_class
                .as_deref()
                .and_then(|class| class.chars().next());
            let cabin = self
                .tables
                .cabin_codes
                .resolve(&detail.cabin)
                .map(|cabin| self.tables.overrides.apply(carrier, cabin, booking_class));
            let conversion = &bound.prices.miles_conversion;

            candidates.push(FareCandidate {
                cabin,
                raw_code: detail.cabin.clone(),
                miles_required: conversion.converted_miles.base,
                cash_fee: (conversion.converted_miles.total_taxes / 100.0).ceil(),
                currency: conversion.remaining_non_converted.currency_code.clone(),
                booking_class,
                source_id: Self::SOURCE_ID.to_string(),
                is_saver_fare: None,
            });
        }
        let fares = reduce_candidates(carrier, &flight_no, candidates)?;

        Ok(Some(FlightRecord {
            departure_date_time: parse_local_minute(Self::SOURCE_ID, &lookup.departure.date_time)?,
            arrival_date_time: parse_local_minute(Self::SOURCE_ID, &lookup.arrival.date_time)?,
            origin: lookup.departure.location_code.clone(),
            destination: lookup.arrival.location_code.clone(),
            flight_number: flight_no,
            duration_minutes: (lookup.duration as f64 / 60.0).round() as u32,
            aircraft_name,
            // Not reported by this source
            amenities: Amenities::default(),
            fares,
        }))
    }
}

impl SourceAdapter for AeroplanAdapter {
    fn source_id(&self) -> &str {
        Self::SOURCE_ID
    }

    fn parse(&self, query: &FlightQuery, raw: &[u8]) -> Result<Vec<FlightRecord>, SourceError> {
        let response: AeroplanResponse = decode_json(Self::SOURCE_ID, raw)?;
        let Some((groups, dictionaries)) = response
            .classify(&self.tables.benign_error_codes)
            .into_result(Self::SOURCE_ID)?
        else {
            debug!(source = Self::SOURCE_ID, %query, "no air bounds reported");
            return Ok(Vec::new());
        };

        let mut flights = Vec::new();
        for group in groups {
            if let Some(flight) = self.standardize_group(query, group, &dictionaries)? {
                flights.push(flight);
            }
        }
        Ok(flights)
    }
}
