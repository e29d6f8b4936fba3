// Query orchestration: fan a search out to adapters, fan results back in.
//
// Fetches run concurrently, but outcomes are resequenced into the requested
// source order before aggregation so merges never depend on network timing.

use crate::adapter::AdapterRegistry;
use crate::aggregator::{AggregateResult, Aggregator, SourceOutcome};
use crate::error::{FetchError, SourceError};
use crate::fetch::RawFetcher;
use crate::schema::{FlightQuery, FlightRecord};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_concurrent_sources: usize,
    pub source_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sources: 4,
            source_timeout_ms: 60_000,
        }
    }
}

/// Running counters per source id, across every search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub requests: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub flights: usize,
}

/// Result of one search: possibly partial flights plus what went wrong.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub query: FlightQuery,
    pub flights: Vec<FlightRecord>,
    pub failures: BTreeMap<String, SourceError>,
    /// Sources that were cancelled. They are neither results nor failures.
    pub cancelled: Vec<String>,
}

enum SourceRun {
    Finished(SourceOutcome),
    Cancelled(String),
}

pub struct QueryOrchestrator {
    registry: Arc<AdapterRegistry>,
    fetcher: Arc<dyn RawFetcher>,
    aggregator: Aggregator,
    config: OrchestratorConfig,
    stats: DashMap<String, SourceStats>,
}

impl QueryOrchestrator {
    pub fn new(
        registry: AdapterRegistry,
        fetcher: Arc<dyn RawFetcher>,
        aggregator: Aggregator,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            fetcher,
            aggregator,
            config,
            stats: DashMap::new(),
        }
    }

    /// Runs `sources` for `query`. Their order is the merge priority; a
    /// repeated id only runs at its first position.
    pub async fn search(
        &self,
        query: &FlightQuery,
        sources: &[String],
        cancel: &CancellationToken,
    ) -> SearchOutcome {
        let started = Instant::now();

        let mut seen = HashSet::with_capacity(sources.len());
        let unique: Vec<&str> = sources
            .iter()
            .map(String::as_str)
            .filter(|source_id| {
                let first = seen.insert(*source_id);
                if !first {
                    debug!(source = *source_id, "duplicate source skipped");
                }
                first
            })
            .collect();

        let runs: Vec<SourceRun> = stream::iter(unique)
            .map(|source_id| self.run_source(query, source_id, cancel.child_token()))
            .buffered(self.config.max_concurrent_sources.max(1))
            .collect()
            .await;

        let mut outcomes = Vec::with_capacity(runs.len());
        let mut cancelled = Vec::new();
        for run in runs {
            match run {
                SourceRun::Finished(outcome) => outcomes.push(outcome),
                SourceRun::Cancelled(source_id) => cancelled.push(source_id),
            }
        }

        let AggregateResult { flights, failures } = self.aggregator.aggregate(outcomes);
        info!(
            %query,
            flights = flights.len(),
            failed = failures.len(),
            cancelled = cancelled.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search finished"
        );

        SearchOutcome {
            query: query.clone(),
            flights,
            failures,
            cancelled,
        }
    }

    pub fn stats(&self) -> BTreeMap<String, SourceStats> {
        self.stats
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    async fn run_source(
        &self,
        query: &FlightQuery,
        source_id: &str,
        cancel: CancellationToken,
    ) -> SourceRun {
        self.record(source_id, |stats| stats.requests += 1);

        let adapter = match self.registry.get(source_id) {
            Ok(adapter) => adapter,
            Err(error) => return self.finish(source_id, Err(error)),
        };

        let timeout_ms = self.config.source_timeout_ms;
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(source = source_id, %query, "source cancelled");
                self.record(source_id, |stats| stats.cancelled += 1);
                return SourceRun::Cancelled(source_id.to_string());
            }
            fetched = tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                self.fetcher.fetch(source_id, query),
            ) => fetched,
        };

        let result = match fetched {
            Err(_) => Err(SourceError::unavailable(source_id, FetchError::Timeout(timeout_ms))),
            Ok(Err(error)) => Err(SourceError::unavailable(source_id, error)),
            Ok(Ok(payload)) => adapter.parse(query, &payload),
        };
        self.finish(source_id, result)
    }

    fn finish(&self, source_id: &str, result: Result<Vec<FlightRecord>, SourceError>) -> SourceRun {
        match &result {
            Ok(flights) => {
                let count = flights.len();
                debug!(source = source_id, flights = count, "source finished");
                self.record(source_id, |stats| {
                    stats.succeeded += 1;
                    stats.flights += count;
                });
            }
            Err(error) => {
                warn!(source = source_id, %error, "source failed");
                self.record(source_id, |stats| stats.failed += 1);
            }
        }
        SourceRun::Finished(SourceOutcome {
            source_id: source_id.to_string(),
            result,
        })
    }

    fn record(&self, source_id: &str, update: impl FnOnce(&mut SourceStats)) {
        let mut entry = self.stats.entry(source_id.to_string()).or_default();
        update(entry.value_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SourceAdapter;
    use crate::fetch::StaticFetcher;
    use crate::reference::{AmenityTable, ReferenceData};
    use crate::schema::{Amenities, Cabin, FareRecord};
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::NaiveDate;
    use parking_lot::Mutex;

    const AA_SAMPLE: &str = include_str!("../samples/aa_sfo_lax.json");
    const AEROPLAN_SAMPLE: &str = include_str!("../samples/aeroplan_sfo_lax.json");

    // Payload is already a JSON list of canonical records.
    struct CanonicalAdapter(&'static str);

    impl SourceAdapter for CanonicalAdapter {
        fn source_id(&self) -> &str {
            self.0
        }

        fn parse(&self, _query: &FlightQuery, raw: &[u8]) -> Result<Vec<FlightRecord>, SourceError> {
            serde_json::from_slice(raw).map_err(|e| SourceError::unparseable(self.0, e))
        }
    }

    // Serves canned payloads after a per-source delay and logs completion order.
    struct ScriptedFetcher {
        script: BTreeMap<&'static str, (u64, Result<Bytes, FetchError>)>,
        completed: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn new(script: Vec<(&'static str, u64, Result<Bytes, FetchError>)>) -> Self {
            Self {
                script: script
                    .into_iter()
                    .map(|(id, delay, result)| (id, (delay, result)))
                    .collect(),
                completed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RawFetcher for ScriptedFetcher {
        async fn fetch(&self, source_id: &str, _query: &FlightQuery) -> Result<Bytes, FetchError> {
            let (delay, result) = self
                .script
                .get(source_id)
                .cloned()
                .unwrap_or((0, Err(FetchError::NoPayload(source_id.to_string()))));
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.completed.lock().push(source_id.to_string());
            result
        }
    }

    fn query() -> FlightQuery {
        FlightQuery::new("SFO", "LAX", NaiveDate::from_ymd_opt(2025, 6, 11).unwrap())
    }

    fn sources(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn ua200(source: &str, cabin: Cabin, miles: u32) -> FlightRecord {
        let day = NaiveDate::from_ymd_opt(2025, 6, 11).unwrap();
        FlightRecord {
            departure_date_time: day.and_hms_opt(10, 0, 0).unwrap(),
            arrival_date_time: day.and_hms_opt(11, 35, 0).unwrap(),
            origin: "SFO".to_string(),
            destination: "LAX".to_string(),
            flight_number: "UA 200".to_string(),
            duration_minutes: 95,
            aircraft_name: "Boeing 737-900".to_string(),
            amenities: Amenities::default(),
            fares: vec![FareRecord {
                cabin,
                miles_required: miles,
                cash_fee: 5.6,
                currency: "USD".to_string(),
                booking_class: None,
                source_id: source.to_string(),
                is_saver_fare: None,
            }],
        }
    }

    fn payload(records: Vec<FlightRecord>) -> Result<Bytes, FetchError> {
        Ok(Bytes::from(serde_json::to_vec(&records).unwrap()))
    }

    fn canonical_orchestrator(fetcher: Arc<dyn RawFetcher>, config: OrchestratorConfig) -> QueryOrchestrator {
        let mut registry = AdapterRegistry::new();
        for id in ["slow", "fast", "broken", "hung"] {
            registry.register(Arc::new(CanonicalAdapter(id)));
        }
        QueryOrchestrator::new(
            registry,
            fetcher,
            Aggregator::new(Arc::new(AmenityTable::default())),
            config,
        )
    }

    #[tokio::test]
    async fn test_sample_payloads_from_both_sources() {
        let reference = ReferenceData::from_json_str(
            r#"{ "amenities": [ { "airlineCode": "UA", "podsAircraft": ["787"] } ] }"#,
        )
        .unwrap();
        let fetcher = StaticFetcher::new()
            .with_payload("aa", AA_SAMPLE)
            .with_payload("aeroplan", AEROPLAN_SAMPLE);
        let orchestrator = QueryOrchestrator::new(
            AdapterRegistry::with_defaults(&reference),
            Arc::new(fetcher),
            Aggregator::new(Arc::new(reference.amenities.clone())),
            OrchestratorConfig::default(),
        );

        let outcome = orchestrator
            .search(&query(), &sources(&["aa", "aeroplan"]), &CancellationToken::new())
            .await;

        assert!(outcome.failures.is_empty());
        assert!(outcome.cancelled.is_empty());
        let numbers: Vec<_> = outcome.flights.iter().map(|f| f.flight_number.as_str()).collect();
        assert_eq!(numbers, vec!["AA 100", "B6 1000", "UA 200"]);
        // Aeroplan reports no amenities, the static table fills pods in
        assert_eq!(outcome.flights[2].amenities.has_pods, Some(false));
    }

    #[tokio::test]
    async fn test_merge_order_follows_priority_not_completion() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            ("slow", 60, payload(vec![ua200("slow", Cabin::Economy, 12500)])),
            ("fast", 0, payload(vec![ua200("fast", Cabin::Economy, 12500)])),
        ]));
        let orchestrator = canonical_orchestrator(fetcher.clone(), OrchestratorConfig::default());

        let outcome = orchestrator
            .search(&query(), &sources(&["slow", "fast"]), &CancellationToken::new())
            .await;

        assert_eq!(*fetcher.completed.lock(), vec!["fast", "slow"]);
        assert_eq!(outcome.flights.len(), 1);
        assert_eq!(outcome.flights[0].fares[0].source_id, "slow");
    }

    #[tokio::test]
    async fn test_failed_source_does_not_abort_search() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            ("broken", 0, Err(FetchError::Navigation("blocked".to_string()))),
            ("fast", 0, payload(vec![ua200("fast", Cabin::Business, 35000)])),
        ]));
        let orchestrator = canonical_orchestrator(fetcher, OrchestratorConfig::default());

        let outcome = orchestrator
            .search(&query(), &sources(&["broken", "fast"]), &CancellationToken::new())
            .await;

        assert_eq!(outcome.flights.len(), 1);
        assert!(matches!(
            outcome.failures.get("broken"),
            Some(SourceError::SourceUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_slow_source_times_out() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            ("hung", 5_000, payload(Vec::new())),
            ("fast", 0, payload(vec![ua200("fast", Cabin::Economy, 12500)])),
        ]));
        let config = OrchestratorConfig {
            source_timeout_ms: 20,
            ..OrchestratorConfig::default()
        };
        let orchestrator = canonical_orchestrator(fetcher, config);

        let outcome = orchestrator
            .search(&query(), &sources(&["hung", "fast"]), &CancellationToken::new())
            .await;

        assert_eq!(outcome.flights.len(), 1);
        assert_eq!(
            outcome.failures.get("hung"),
            Some(&SourceError::unavailable("hung", FetchError::Timeout(20)))
        );
    }

    #[tokio::test]
    async fn test_cancelled_source_is_absent_not_failed() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            ("fast", 0, payload(vec![ua200("fast", Cabin::Economy, 12500)])),
            ("hung", 5_000, payload(vec![ua200("hung", Cabin::Economy, 1000)])),
        ]));
        let orchestrator = canonical_orchestrator(fetcher, OrchestratorConfig::default());
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        let outcome = orchestrator
            .search(&query(), &sources(&["fast", "hung"]), &cancel)
            .await;

        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.cancelled, vec!["hung"]);
        assert_eq!(outcome.flights.len(), 1);
        assert_eq!(outcome.flights[0].fares[0].miles_required, 12500);
        assert_eq!(orchestrator.stats()["hung"].cancelled, 1);
    }

    #[tokio::test]
    async fn test_repeated_source_runs_once() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            ("broken", 0, Err(FetchError::Navigation("blocked".to_string()))),
            ("fast", 0, payload(vec![ua200("fast", Cabin::Economy, 12500)])),
        ]));
        let orchestrator = canonical_orchestrator(fetcher.clone(), OrchestratorConfig::default());

        let outcome = orchestrator
            .search(
                &query(),
                &sources(&["broken", "fast", "broken", "fast"]),
                &CancellationToken::new(),
            )
            .await;

        let mut completed = fetcher.completed.lock().clone();
        completed.sort();
        assert_eq!(completed, vec!["broken", "fast"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.flights.len(), 1);
        assert_eq!(outcome.flights[0].fares.len(), 1);
        let stats = orchestrator.stats();
        assert_eq!(stats["broken"].requests, 1);
        assert_eq!(stats["fast"].requests, 1);
    }

    #[tokio::test]
    async fn test_unknown_source_is_reported() {
        let orchestrator =
            canonical_orchestrator(Arc::new(StaticFetcher::new()), OrchestratorConfig::default());

        let outcome = orchestrator
            .search(&query(), &sources(&["delta"]), &CancellationToken::new())
            .await;

        assert_eq!(
            outcome.failures.get("delta"),
            Some(&SourceError::UnknownSource("delta".to_string()))
        );
    }

    #[tokio::test]
    async fn test_stats_accumulate_across_searches() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            ("fast", 0, payload(vec![ua200("fast", Cabin::Economy, 12500)])),
            ("broken", 0, Ok(Bytes::from_static(b"not json"))),
        ]));
        let orchestrator = canonical_orchestrator(fetcher, OrchestratorConfig::default());

        for _ in 0..2 {
            orchestrator
                .search(&query(), &sources(&["fast", "broken"]), &CancellationToken::new())
                .await;
        }

        let stats = orchestrator.stats();
        assert_eq!(
            stats["fast"],
            SourceStats {
                requests: 2,
                succeeded: 2,
                failed: 0,
                cancelled: 0,
                flights: 2,
            }
        );
        assert_eq!(stats["broken"].failed, 2);
    }
}
