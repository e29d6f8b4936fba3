// Source adapter contract, shared parsing helpers and the adapter registry
use crate::error::SourceError;
use crate::reference::ReferenceData;
use crate::schema::{FlightQuery, FlightRecord};
use crate::sources::{AaAdapter, AeroplanAdapter};
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

/// Turns one source's raw response into canonical flight records.
///
/// Implementations are pure: no I/O, no shared mutable state. They must
/// - skip itineraries with more than one segment,
/// - skip itineraries whose endpoints differ from the query's,
/// - fail the whole query on an unmapped cabin code,
/// - reduce fares to one per cabin before returning.
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &str;

    fn parse(&self, query: &FlightQuery, raw: &[u8]) -> Result<Vec<FlightRecord>, SourceError>;
}

/// Classification of a decoded payload before any flight is looked at.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadStatus<T> {
    Success(T),
    /// The source answered "no results" through an error code.
    BenignEmpty,
    Fatal { code: i64, message: String },
}

impl<T> PayloadStatus<T> {
    /// `Ok(None)` for a benign empty answer.
    pub fn into_result(self, source_id: &str) -> Result<Option<T>, SourceError> {
        match self {
            PayloadStatus::Success(data) => Ok(Some(data)),
            PayloadStatus::BenignEmpty => Ok(None),
            PayloadStatus::Fatal { code, message } => Err(SourceError::SourceReported {
                source_id: source_id.to_string(),
                code,
                message,
            }),
        }
    }
}

pub fn decode_json<T: DeserializeOwned>(source_id: &str, raw: &[u8]) -> Result<T, SourceError> {
    serde_json::from_slice(raw).map_err(|e| SourceError::unparseable(source_id, e))
}

/// True only for a single-segment itinerary between exactly the queried airports.
pub fn is_requested_nonstop(
    query: &FlightQuery,
    segment_count: usize,
    origin: &str,
    destination: &str,
) -> bool {
    segment_count == 1 && origin == query.origin && destination == query.destination
}

/// Parses a source-local timestamp down to minute precision, dropping any
/// seconds, fraction or offset. Accepts `T` or a space between date and time.
pub fn parse_local_minute(source_id: &str, raw: &str) -> Result<NaiveDateTime, SourceError> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let (date, time) = match compact.split_once('T') {
        Some(parts) => parts,
        None => (
            compact.get(..10).unwrap_or(compact.as_str()),
            compact.get(10..).unwrap_or_default(),
        ),
    };
    let time = time
        .get(..5)
        .ok_or_else(|| SourceError::unparseable(source_id, format!("timestamp too short: {raw}")))?;

    NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M")
        .map_err(|e| SourceError::unparseable(source_id, format!("bad timestamp {raw}: {e}")))
}

/// Adapters by source id, built once at startup.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every built-in adapter against the given tables.
    pub fn with_defaults(reference: &ReferenceData) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AaAdapter::new(Arc::new(reference.aa.clone()))));
        registry.register(Arc::new(AeroplanAdapter::new(Arc::new(
            reference.aeroplan.clone(),
        ))));
        registry
    }

    /// Returns the adapter previously registered under the same id, if any.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters
            .insert(adapter.source_id().to_string(), adapter)
    }

    pub fn get(&self, source_id: &str) -> Result<Arc<dyn SourceAdapter>, SourceError> {
        self.adapters
            .get(source_id)
            .cloned()
            .ok_or_else(|| SourceError::UnknownSource(source_id.to_string()))
    }

    pub fn source_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.adapters.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("sources", &self.source_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use test_case::test_case;

    struct EmptyAdapter;

    impl SourceAdapter for EmptyAdapter {
        fn source_id(&self) -> &str {
            "empty"
        }

        fn parse(&self, _query: &FlightQuery, _raw: &[u8]) -> Result<Vec<FlightRecord>, SourceError> {
            Ok(Vec::new())
        }
    }

    fn query() -> FlightQuery {
        FlightQuery::new("SFO", "LAX", NaiveDate::from_ymd_opt(2025, 6, 11).unwrap())
    }

    #[test_case("2025-06-11T08:05:00.000-07:00", 8, 5; "iso with offset")]
    #[test_case("2025-06-11 08:05", 8, 5; "space separated")]
    #[test_case("2025-06-11T23:59:59", 23, 59; "seconds dropped")]
    #[test_case("2025-06-11 T08:05:00", 8, 5; "stray space before T")]
    fn test_parse_local_minute(raw: &str, hour: u32, minute: u32) {
        let parsed = parse_local_minute("aa", raw).unwrap();
        let expected = NaiveDate::from_ymd_opt(2025, 6, 11)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap();
        assert_eq!(parsed, expected);
    }

    #[test_case(""; "empty")]
    #[test_case("2025-06-11"; "date only")]
    #[test_case("not a timestamp at all"; "garbage")]
    fn test_parse_local_minute_rejects(raw: &str) {
        assert!(matches!(
            parse_local_minute("aa", raw),
            Err(SourceError::UnparseableResponse { .. })
        ));
    }

    #[test_case(1, "SFO", "LAX", true; "nonstop on requested route")]
    #[test_case(2, "SFO", "LAX", false; "connection")]
    #[test_case(1, "OAK", "LAX", false; "nearby origin substituted")]
    #[test_case(1, "SFO", "BUR", false; "nearby destination substituted")]
    fn test_is_requested_nonstop(segments: usize, origin: &str, destination: &str, expected: bool) {
        assert_eq!(
            is_requested_nonstop(&query(), segments, origin, destination),
            expected
        );
    }

    #[test]
    fn test_payload_status_classification() {
        assert_eq!(PayloadStatus::Success(3).into_result("aa"), Ok(Some(3)));
        assert_eq!(PayloadStatus::<i32>::BenignEmpty.into_result("aa"), Ok(None));
        assert_eq!(
            PayloadStatus::<i32>::Fatal {
                code: 500,
                message: "boom".to_string()
            }
            .into_result("aa"),
            Err(SourceError::SourceReported {
                source_id: "aa".to_string(),
                code: 500,
                message: "boom".to_string(),
            })
        );
    }

    #[test]
    fn test_registry_defaults_and_lookup() {
        let mut registry = AdapterRegistry::with_defaults(&ReferenceData::default());
        assert_eq!(registry.source_ids(), vec!["aa", "aeroplan"]);
        assert!(registry.register(Arc::new(EmptyAdapter)).is_none());
        assert_eq!(registry.len(), 3);

        let adapter = registry.get("empty").unwrap();
        assert_eq!(adapter.parse(&query(), b"").unwrap(), Vec::new());
        assert_eq!(
            registry.get("delta").err(),
            Some(SourceError::UnknownSource("delta".to_string()))
        );
    }
}
