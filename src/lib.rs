// Award flight fare normalization and cross-source aggregation

pub mod adapter;
pub mod aggregator;
pub mod error;
pub mod fetch;
pub mod orchestrator;
pub mod reducer;
pub mod reference;
pub mod schema;
pub mod sources;

// Re-export key types for convenience
pub use adapter::{AdapterRegistry, PayloadStatus, SourceAdapter};
pub use aggregator::{AggregateResult, Aggregator, SourceOutcome};
pub use error::{FetchError, ReferenceError, SourceError};
pub use fetch::{RawFetcher, RetryConfig, RetryingFetcher, StaticFetcher};
pub use orchestrator::{OrchestratorConfig, QueryOrchestrator, SearchOutcome, SourceStats};
pub use reducer::{lowest_per_cabin, reduce_candidates};
pub use reference::{AmenityTable, CabinCodeMap, CabinOverride, CabinOverrides, ReferenceData};
pub use schema::{Amenities, Cabin, FareRecord, FlightQuery, FlightRecord};
