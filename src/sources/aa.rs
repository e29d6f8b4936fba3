// American Airlines itinerary search adapter
use crate::adapter::{
    decode_json, is_requested_nonstop, parse_local_minute, PayloadStatus, SourceAdapter,
};
use crate::error::SourceError;
use crate::reducer::reduce_candidates;
use crate::reference::AaTables;
use crate::schema::{
    flight_number, Amenities, Cabin, FareCandidate, FlightQuery, FlightRecord,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

// Data structures for the itinerary search JSON response
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AaResponse {
    pub error_number: Option<i64>,
    pub error: Option<String>,
    pub message: Option<String>,
    pub slices: Vec<AaSlice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AaSlice {
    pub duration_in_minutes: u32,
    pub segments: Vec<AaSegment>,
    #[serde(default)]
    pub pricing_detail: Vec<AaProduct>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AaSegment {
    pub origin: AaAirport,
    pub destination: AaAirport,
    pub departure_date_time: String,
    pub arrival_date_time: String,
    pub flight: AaFlight,
    #[serde(default)]
    pub legs: Vec<AaLeg>,
}

#[derive(Debug, Deserialize)]
pub struct AaAirport {
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AaFlight {
    pub carrier_code: String,
    pub flight_number: String,
}

#[derive(Debug, Deserialize)]
pub struct AaLeg {
    pub aircraft: AaAircraft,
    #[serde(default)]
    pub amenities: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AaAircraft {
    pub code: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AaProduct {
    #[serde(default)]
    pub product_available: bool,
    pub product_type: String,
    pub extended_fare_code: Option<String>,
    pub per_passenger_award_points: u32,
    pub per_passenger_taxes_and_fees: AaMoney,
}

#[derive(Debug, Deserialize)]
pub struct AaMoney {
    pub amount: f64,
    pub currency: String,
}

impl AaResponse {
    /// The source reports failures through either an `error` or a `message`
    /// field next to a positive `errorNumber`.
    pub fn classify(self, benign_codes: &[i64]) -> PayloadStatus<Vec<AaSlice>> {
        match self.error_number.unwrap_or(0) {
            code if code <= 0 => PayloadStatus::Success(self.slices),
            code if benign_codes.contains(&code) => PayloadStatus::BenignEmpty,
            code => PayloadStatus::Fatal {
                code,
                message: self
                    .error
                    .or(self.message)
                    .unwrap_or_else(|| format!("error number {code}")),
            },
        }
    }
}

pub struct AaAdapter {
    tables: Arc<AaTables>,
}

impl AaAdapter {
    pub const SOURCE_ID: &'static str = "aa";

    pub fn new(tables: Arc<AaTables>) -> Self {
        Self { tables }
    }

    /// Award fare codes win over standard fare codes, which win over the
    /// product type. The bool is true when the award family matched.
    fn resolve_cabin(&self, fare_letter: Option<&str>, product_type: &str) -> (Option<Cabin>, bool) {
        let award = fare_letter.and_then(|letter| self.tables.award_fare_codes.resolve(letter));
        if award.is_some() {
            return (award, true);
        }
        let cabin = fare_letter
            .and_then(|letter| self.tables.standard_fare_codes.resolve(letter))
            .or_else(|| self.tables.product_types.resolve(product_type));
        (cabin, false)
    }

    fn standardize_slice(
        &self,
        query: &FlightQuery,
        slice: AaSlice,
    ) -> Result<Option<FlightRecord>, SourceError> {
        let segment_count = slice.segments.len();
        let segment = slice
            .segments
            .first()
            .ok_or_else(|| SourceError::unparseable(Self::SOURCE_ID, "slice without segments"))?;
        let flight_no = flight_number(&segment.flight.carrier_code, &segment.flight.flight_number);

        if !is_requested_nonstop(
            query,
            segment_count,
            &segment.origin.code,
            &segment.destination.code,
        ) {
            debug!(
                source = Self::SOURCE_ID,
                flight = %flight_no,
                segments = segment_count,
                origin = %segment.origin.code,
                destination = %segment.destination.code,
                "skipping itinerary"
            );
            return Ok(None);
        }

        let leg = segment
            .legs
            .first()
            .ok_or_else(|| SourceError::unparseable(Self::SOURCE_ID, format!("{flight_no} has no legs")))?;
        let aircraft_name = leg
            .aircraft
            .name
            .clone()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| SourceError::UnknownAircraft {
                flight_number: flight_no.clone(),
                code: leg.aircraft.code.clone().unwrap_or_default(),
            })?;

        let carrier = segment.flight.carrier_code.as_str();
        let candidates = slice
            .pricing_detail
            .iter()
            .filter(|product| product.product_available)
            .map(|product| {
                let fare_letter = product
                    .extended_fare_code
                    .as_deref()
                    .and_then(|code| code.get(..1));
                let booking_class = fare_letter.and_then(|letter| letter.chars().next());
                let (cabin, is_saver) = self.resolve_cabin(fare_letter, &product.product_type);
                let cabin = cabin.map(|cabin| self.tables.overrides.apply(carrier, cabin, booking_class));

                FareCandidate {
                    cabin,
                    raw_code: format!(
                        "fare code {}, product type {}",
                        fare_letter.unwrap_or("undefined"),
                        product.product_type
                    ),
                    miles_required: product.per_passenger_award_points,
                    cash_fee: product.per_passenger_taxes_and_fees.amount,
                    currency: product.per_passenger_taxes_and_fees.currency.clone(),
                    booking_class,
                    source_id: Self::SOURCE_ID.to_string(),
                    is_saver_fare: Some(is_saver),
                }
            })
            .collect();
        let fares = reduce_candidates(carrier, &flight_no, candidates)?;

        Ok(Some(FlightRecord {
            departure_date_time: parse_local_minute(Self::SOURCE_ID, &segment.departure_date_time)?,
            arrival_date_time: parse_local_minute(Self::SOURCE_ID, &segment.arrival_date_time)?,
            origin: segment.origin.code.clone(),
            destination: segment.destination.code.clone(),
            flight_number: flight_no,
            duration_minutes: slice.duration_in_minutes,
            aircraft_name,
            amenities: Amenities {
                has_pods: Some(leg.amenities.iter().any(|a| a.contains("lie-flat"))),
                has_wifi: Some(leg.amenities.iter().any(|a| a.contains("wifi"))),
            },
            fares,
        }))
    }
}

impl SourceAdapter for AaAdapter {
    fn source_id(&self) -> &str {
        Self::SOURCE_ID
    }

    fn parse(&self, query: &FlightQuery, raw: &[u8]) -> Result<Vec<FlightRecord>, SourceError> {
        let response: AaResponse = decode_json(Self::SOURCE_ID, raw)?;
        let Some(slices) = response
            .classify(&self.tables.benign_error_codes)
            .into_result(Self::SOURCE_ID)?
        else {
            debug!(source = Self::SOURCE_ID, %query, "no itineraries reported");
            return Ok(Vec::new());
        };

        let mut flights = Vec::new();
        for slice in slices {
            if let Some(flight) = self.standardize_slice(query, slice)? {
                flights.push(flight);
            }
        }
        Ok(flights)
    }
}
