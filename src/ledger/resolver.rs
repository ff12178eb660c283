//! Rate-limited resolution of candidate transactions.
//!
//! Every call goes through the injected [`AdaptiveRateLimiter`]. Transient
//! failures (throttling, transport errors, 5xx) are retried with capped
//! exponential backoff; after the configured number of retries the item is
//! reported as unavailable and the caller skips it. Resolved records are
//! cached for the life of the resolver so each signature is fetched at most
//! once per run.

use crate::config::RetryPolicy;
use crate::error::{Result, ScanError};
use crate::ledger::LedgerApi;
use crate::rate_limit::AdaptiveRateLimiter;
use crate::types::{CandidateRef, DetailRecord};
use moka::future::Cache;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;
use tracing::{debug, instrument, warn};

/// Upper bound on records cached per run.
const MAX_CACHED_RECORDS: u64 = 1_000;

pub struct DetailResolver {
    ledger: Arc<dyn LedgerApi>,
    limiter: Mutex<AdaptiveRateLimiter>,
    retry: RetryPolicy,
    resolved: Cache<String, Arc<DetailRecord>>,
}

impl DetailResolver {
    pub fn new(
        ledger: Arc<dyn LedgerApi>,
        limiter: AdaptiveRateLimiter,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            limiter: Mutex::new(limiter),
            retry,
            resolved: Cache::builder().max_capacity(MAX_CACHED_RECORDS).build(),
        }
    }

    /// Resolve one candidate into its full record.
    ///
    /// Fails with `ScanError::ItemUnavailable` once retries are exhausted or
    /// the failure is not transient.
    #[instrument(skip(self, candidate), fields(id = %candidate.id))]
    pub async fn resolve(&self, candidate: &CandidateRef) -> Result<Arc<DetailRecord>> {
        self.resolved
            .try_get_with(candidate.id.clone(), self.fetch_with_retries(&candidate.id))
            .await
            .map_err(|err| (*err).clone())
    }

    async fn fetch_with_retries(&self, id: &str) -> Result<Arc<DetailRecord>> {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor((self.retry.initial_backoff_ms / 2).max(1))
            .max_delay(self.retry.max_backoff())
            .take(self.retry.max_retries);

        let record = RetryIf::spawn(
            strategy,
            || self.fetch_once(id),
            |err: &ScanError| err.is_retryable(),
        )
        .await
        .map_err(|err| {
            warn!("Giving up on {}: {}", id, err);
            err
        })?;

        Ok(Arc::new(record))
    }

    async fn fetch_once(&self, id: &str) -> Result<DetailRecord> {
        self.limiter.lock().await.acquire().await;

        let result = self.ledger.transaction(id).await;

        let mut limiter = self.limiter.lock().await;
        match &result {
            Ok(_) => limiter.record_success(),
            Err(err) if err.is_retryable() => {
                debug!("Transient failure for {}: {}", id, err);
                limiter.record_failure();
            }
            Err(_) => limiter.record_success(),
        }
        result
    }
}
