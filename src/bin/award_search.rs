// Replays saved source payloads through the adapters and prints the merged result
use anyhow::{anyhow, Context, Result};
use award_search_core::{
    AdapterRegistry, Aggregator, FlightQuery, OrchestratorConfig, QueryOrchestrator,
    ReferenceData, StaticFetcher,
};
use chrono::NaiveDate;
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "award-search", version, about = "Merge award availability from saved source responses")]
struct Cli {
    /// Origin airport code
    #[arg(long)]
    origin: String,

    /// Destination airport code
    #[arg(long)]
    destination: String,

    /// Departure date (YYYY-MM-DD)
    #[arg(long)]
    date: NaiveDate,

    /// JSON file overriding the built-in reference tables
    #[arg(long)]
    reference: Option<PathBuf>,

    #[arg(long, default_value_t = 60_000)]
    timeout_ms: u64,

    /// SOURCE=FILE pairs, in merge priority order
    #[arg(required = true)]
    payloads: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let reference = match &cli.reference {
        Some(path) => ReferenceData::from_path(path)
            .with_context(|| format!("failed to load reference tables from {}", path.display()))?,
        None => ReferenceData::default(),
    };

    let mut fetcher = StaticFetcher::new();
    let mut sources = Vec::with_capacity(cli.payloads.len());
    for pair in &cli.payloads {
        let (source_id, path) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("expected SOURCE=FILE, got {pair}"))?;
        let payload = std::fs::read(path).with_context(|| format!("failed to read {path}"))?;
        fetcher.insert(source_id, payload);
        sources.push(source_id.to_string());
    }

    let orchestrator = QueryOrchestrator::new(
        AdapterRegistry::with_defaults(&reference),
        Arc::new(fetcher),
        Aggregator::new(Arc::new(reference.amenities.clone())),
        OrchestratorConfig {
            source_timeout_ms: cli.timeout_ms,
            ..OrchestratorConfig::default()
        },
    );

    let query = FlightQuery::new(&cli.origin, &cli.destination, cli.date);
    let outcome = orchestrator
        .search(&query, &sources, &CancellationToken::new())
        .await;

    let errors: Vec<_> = outcome
        .failures
        .iter()
        .map(|(source, error)| json!({ "source": source, "error": error.to_string() }))
        .collect();
    let report = json!({
        "query": outcome.query,
        "flights": outcome.flights,
        "errors": errors,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

fn init_logging() {
    let default_level = "warn";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
