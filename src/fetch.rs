// Fetch seam: how raw payloads reach the core.
//
// Network execution (browser sessions, HTTP) belongs to the collaborator
// implementing `RawFetcher`. Retries live here too, never in the adapters or
// the aggregator.

use crate::error::FetchError;
use crate::schema::FlightQuery;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[async_trait]
pub trait RawFetcher: Send + Sync + 'static {
    /// Raw response bytes of `source_id` for `query`, or the final failure.
    async fn fetch(&self, source_id: &str, query: &FlightQuery) -> Result<Bytes, FetchError>;
}

#[async_trait]
impl<T: RawFetcher + ?Sized> RawFetcher for Arc<T> {
    async fn fetch(&self, source_id: &str, query: &FlightQuery) -> Result<Bytes, FetchError> {
        (**self).fetch(source_id, query).await
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_backoff_ms: 250,
            max_backoff_ms: 5000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

// Exponential backoff with jitter
pub fn calculate_backoff(retry_attempt: u32, config: &RetryConfig) -> Duration {
    let base_backoff_ms = (config.initial_backoff_ms as f64
        * config.backoff_multiplier.powf(retry_attempt as f64))
    .min(config.max_backoff_ms as f64);

    let jitter = rand::random::<f64>() * config.jitter_factor * base_backoff_ms;
    let backoff_ms = base_backoff_ms * (1.0 - config.jitter_factor / 2.0) + jitter;

    Duration::from_millis(backoff_ms as u64)
}

/// Retries transient failures of another fetcher a bounded number of times.
pub struct RetryingFetcher<F> {
    inner: F,
    config: RetryConfig,
}

impl<F: RawFetcher> RetryingFetcher<F> {
    pub fn new(inner: F, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<F: RawFetcher> RawFetcher for RetryingFetcher<F> {
    async fn fetch(&self, source_id: &str, query: &FlightQuery) -> Result<Bytes, FetchError> {
        let mut attempt = 0;
        loop {
            match self.inner.fetch(source_id, query).await {
                Ok(payload) => return Ok(payload),
                Err(error) if error.is_retryable() && attempt < self.config.max_retries => {
                    let delay = calculate_backoff(attempt, &self.config);
                    warn!(source = source_id, %error, attempt, ?delay, "fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Serves canned payloads by source id, whatever the query.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    payloads: HashMap<String, Bytes>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(mut self, source_id: &str, payload: impl Into<Bytes>) -> Self {
        self.insert(source_id, payload);
        self
    }

    pub fn insert(&mut self, source_id: &str, payload: impl Into<Bytes>) {
        self.payloads.insert(source_id.to_string(), payload.into());
    }
}

#[async_trait]
impl RawFetcher for StaticFetcher {
    async fn fetch(&self, source_id: &str, _query: &FlightQuery) -> Result<Bytes, FetchError> {
        self.payloads
            .get(source_id)
            .cloned()
            .ok_or_else(|| FetchError::NoPayload(source_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    // Fails the first `fail_next_requests` calls, then serves a fixed payload.
    struct FlakyFetcher {
        calls: AtomicUsize,
        fail_next_requests: AtomicUsize,
    }

    impl FlakyFetcher {
        fn new(failures: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_next_requests: AtomicUsize::new(failures),
            }
        }
    }

    #[async_trait]
    impl RawFetcher for FlakyFetcher {
        async fn fetch(&self, _source_id: &str, _query: &FlightQuery) -> Result<Bytes, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.fail_next_requests.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_next_requests.store(remaining - 1, Ordering::SeqCst);
                return Err(FetchError::Navigation("page did not load".to_string()));
            }
            Ok(Bytes::from_static(b"{}"))
        }
    }

    fn fast_retries(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            ..RetryConfig::default()
        }
    }

    fn query() -> FlightQuery {
        FlightQuery::new("SFO", "LAX", NaiveDate::from_ymd_opt(2025, 6, 11).unwrap())
    }

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let config = RetryConfig {
            jitter_factor: 0.0,
            ..RetryConfig::default()
        };
        assert_eq!(calculate_backoff(0, &config), Duration::from_millis(250));
        assert_eq!(calculate_backoff(1, &config), Duration::from_millis(500));
        assert_eq!(calculate_backoff(10, &config), Duration::from_millis(5000));
    }

    #[test]
    fn test_backoff_jitter_stays_in_band() {
        let config = RetryConfig::default();
        for _ in 0..100 {
            let delay = calculate_backoff(0, &config).as_millis();
            assert!((237..=262).contains(&delay), "delay {delay} out of band");
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let inner = Arc::new(FlakyFetcher::new(1));
        let fetcher = RetryingFetcher::new(Arc::clone(&inner), fast_retries(1));

        let payload = assert_ok!(fetcher.fetch("aa", &query()).await);
        assert_eq!(payload, Bytes::from_static(b"{}"));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let inner = Arc::new(FlakyFetcher::new(5));
        let fetcher = RetryingFetcher::new(Arc::clone(&inner), fast_retries(2));

        let error = assert_err!(fetcher.fetch("aa", &query()).await);
        assert_eq!(error, FetchError::Navigation("page did not load".to_string()));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_static_fetcher() {
        let fetcher = StaticFetcher::new().with_payload("aa", "{\"slices\":[]}");
        tokio_test::block_on(async {
            let payload = assert_ok!(fetcher.fetch("aa", &query()).await);
            assert_eq!(payload, Bytes::from_static(b"{\"slices\":[]}"));
            assert_eq!(
                fetcher.fetch("aeroplan", &query()).await,
                Err(FetchError::NoPayload("aeroplan".to_string()))
            );
        });
    }
}
