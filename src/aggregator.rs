// Cross-source aggregation: one entry per physical flight, one fare per cabin.
//
// Pure reduction over one query's batch of adapter outcomes. Outcomes must be
// supplied in source-priority order; that order decides ties and which
// record's non-fare fields survive a merge.

use crate::error::SourceError;
use crate::reducer::lowest_per_cabin;
use crate::reference::AmenityTable;
use crate::schema::FlightRecord;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// What one adapter produced for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOutcome {
    pub source_id: String,
    pub result: Result<Vec<FlightRecord>, SourceError>,
}

impl SourceOutcome {
    pub fn success(source_id: &str, flights: Vec<FlightRecord>) -> Self {
        Self {
            source_id: source_id.to_string(),
            result: Ok(flights),
        }
    }

    pub fn failure(source_id: &str, error: SourceError) -> Self {
        Self {
            source_id: source_id.to_string(),
            result: Err(error),
        }
    }
}

/// Merged flights plus the failures of the sources that did not contribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateResult {
    pub flights: Vec<FlightRecord>,
    pub failures: BTreeMap<String, SourceError>,
}

impl AggregateResult {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

pub struct Aggregator {
    amenities: Arc<AmenityTable>,
}

impl Aggregator {
    pub fn new(amenities: Arc<AmenityTable>) -> Self {
        Self { amenities }
    }

    pub fn aggregate(&self, outcomes: Vec<SourceOutcome>) -> AggregateResult {
        let mut failures = BTreeMap::new();
        let mut records = Vec::new();

        for outcome in outcomes {
            match outcome.result {
                Ok(flights) => records.extend(flights),
                Err(error) => {
                    warn!(source = %outcome.source_id, %error, "source failed, continuing without it");
                    failures.insert(outcome.source_id, error);
                }
            }
        }

        let flights = merge_flights(records)
            .into_iter()
            .map(|flight| self.resolve_amenities(flight))
            .collect();

        AggregateResult { flights, failures }
    }

    /// Explicit values from any source beat the static reference.
    fn resolve_amenities(&self, mut flight: FlightRecord) -> FlightRecord {
        if flight.amenities.has_pods.is_none() {
            flight.amenities.has_pods = self
                .amenities
                .has_pods(flight.carrier_code(), &flight.aircraft_name);
        }
        flight
    }
}

/// Merges records sharing a flight number, in input order.
///
/// The first sighting is adopted as the aggregate. Later sightings only
/// contribute fares (re-reduced to the cheapest per cabin, earlier fares
/// winning ties) and amenity fields the aggregate does not know yet.
pub fn merge_flights<I>(records: I) -> Vec<FlightRecord>
where
    I: IntoIterator<Item = FlightRecord>,
{
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<FlightRecord> = Vec::new();

    for record in records {
        match positions.get(&record.flight_number).copied() {
            Some(index) => {
                let aggregate = &mut merged[index];
                let existing = std::mem::take(&mut aggregate.fares);
                aggregate.fares = lowest_per_cabin(existing.into_iter().chain(record.fares));
                aggregate.amenities.fill_missing_from(&record.amenities);
                debug!(flight = %aggregate.flight_number, fares = aggregate.fares.len(), "merged duplicate flight");
            }
            None => {
                positions.insert(record.flight_number.clone(), merged.len());
                merged.push(record);
            }
        }
    }

    merged
}
