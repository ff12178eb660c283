//! Fee-claim detection pipeline.
//!
//! Lists a wallet's recent transactions, resolves them one at a time under
//! the configured rate limit, classifies each record and folds the accepted
//! claims into a [`ClaimReport`]. The scan honors a wall-clock deadline and
//! always returns the report built so far once it is reached.

use crate::claims::aggregate::{aggregate, primary_claim, ClaimFrequency, DedupKey};
use crate::claims::classifier::EvidenceClassifier;
use crate::config::{ScanConfig, MAX_CANDIDATES_CEILING};
use crate::error::{Result, ScanError};
use crate::ledger::{DetailResolver, LedgerApi, PaginatedLister, RpcLedger};
use crate::rate_limit::AdaptiveRateLimiter;
use crate::types::{Address, EvidenceItem, Profile};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{info, instrument, warn};

/// Bounds of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Most candidates listed and examined
    pub max_candidates: usize,
    /// Wall-clock budget for the whole run
    pub max_elapsed: Duration,
}

impl ScanOptions {
    pub fn new(max_candidates: usize, max_elapsed: Duration) -> Self {
        Self {
            max_candidates,
            max_elapsed,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(
            config.default_max_candidates,
            Duration::from_secs(config.default_max_elapsed_seconds),
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_candidates == 0 || self.max_candidates > MAX_CANDIDATES_CEILING {
            return Err(ScanError::Validation(format!(
                "max_candidates must be between 1 and {}",
                MAX_CANDIDATES_CEILING
            )));
        }
        if self.max_elapsed.is_zero() {
            return Err(ScanError::Validation("max_elapsed must be positive".to_string()));
        }
        Ok(())
    }
}

/// Result of one claim scan. Every field is present even when nothing was
/// found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimReport {
    pub wallet: String,
    pub program: String,
    pub has_interacted: bool,
    pub status: String,
    pub candidates_listed: usize,
    pub candidates_examined: usize,
    /// Candidates skipped because they could not be resolved
    pub errors: usize,
    pub deadline_reached: bool,
    /// Distinct claim transactions, regardless of token
    pub claim_transactions: usize,
    pub found_in_tx: Option<String>,
    pub primary_claim: Option<EvidenceItem>,
    pub frequency: ClaimFrequency,
    /// Claims deduplicated per token, newest first
    pub profile: Profile,
    pub error: Option<String>,
}

impl ClaimReport {
    fn empty(wallet: &str, program: &str, status: impl Into<String>) -> Self {
        Self {
            wallet: wallet.to_string(),
            program: program.to_string(),
            has_interacted: false,
            status: status.into(),
            candidates_listed: 0,
            candidates_examined: 0,
            errors: 0,
            deadline_reached: false,
            claim_transactions: 0,
            found_in_tx: None,
            primary_claim: None,
            frequency: ClaimFrequency::default(),
            profile: Profile::default(),
            error: None,
        }
    }

    /// Zero-valued report describing a surfaced failure.
    pub fn failed(wallet: &str, program: &str, err: &ScanError) -> Self {
        Self {
            error: Some(format!("Check failed: {}", err)),
            ..Self::empty(wallet, program, "Error occurred")
        }
    }
}

/// Counters and evidence gathered while scanning candidates.
#[derive(Default)]
struct ScanTally {
    examined: usize,
    errors: usize,
    deadline_reached: bool,
    evidence: Vec<EvidenceItem>,
}

pub struct ClaimDetector {
    ledger: Arc<dyn LedgerApi>,
    config: ScanConfig,
}

impl ClaimDetector {
    pub fn new(ledger: Arc<dyn LedgerApi>, config: ScanConfig) -> Self {
        Self { ledger, config }
    }

    /// Detector talking to the configured JSON-RPC endpoint.
    pub fn with_rpc(config: ScanConfig) -> Result<Self> {
        let http_client = Client::builder().build()?;
        let ledger = RpcLedger::new(http_client, config.rpc_url.clone(), config.request_timeout());
        Ok(Self::new(Arc::new(ledger), config))
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan `subject`'s recent transactions for claims from `program`.
    ///
    /// Fails only on invalid input or when the listing call fails.
    #[instrument(skip(self, options))]
    pub async fn detect_claims(
        &self,
        subject: &str,
        program: &str,
        options: ScanOptions,
    ) -> Result<ClaimReport> {
        let subject = Address::parse(subject)?;
        let program = Address::parse(program)?;
        options.validate()?;

        let deadline = Instant::now() + options.max_elapsed;
        info!("Checking balance changes for wallet: {}", subject);

        let lister = PaginatedLister::new(self.ledger.clone(), self.config.list_page_size);
        let listing = lister.list(&subject, options.max_candidates);
        let candidates = match timeout_at(deadline, listing).await {
            Ok(listed) => listed?,
            Err(_) => {
                warn!("Deadline reached while listing transactions");
                let mut report =
                    ClaimReport::empty(subject.as_str(), program.as_str(), "No Fee Claims Found");
                report.deadline_reached = true;
                return Ok(report);
            }
        };

        if candidates.is_empty() {
            return Ok(ClaimReport::empty(
                subject.as_str(),
                program.as_str(),
                "No transactions found for wallet",
            ));
        }

        let resolver = DetailResolver::new(
            self.ledger.clone(),
            AdaptiveRateLimiter::from_config(&self.config.rate_limit),
            self.config.retry.clone(),
        );
        let classifier =
            EvidenceClassifier::new(program.clone(), self.config.token_pattern.clone());

        info!("Checking {} transactions for fee program interactions", candidates.len());
        let mut tally = ScanTally::default();

        for (index, candidate) in candidates.iter().enumerate() {
            if Instant::now() >= deadline {
                tally.deadline_reached = true;
                break;
            }

            let record = match timeout_at(deadline, resolver.resolve(candidate)).await {
                Err(_) => {
                    tally.deadline_reached = true;
                    break;
                }
                Ok(Err(err)) => {
                    warn!(
                        "Skipping tx {}/{} {}: {}",
                        index + 1,
                        candidates.len(),
                        candidate.id,
                        err
                    );
                    tally.examined += 1;
                    tally.errors += 1;
                    continue;
                }
                Ok(Ok(record)) => record,
            };
            tally.examined += 1;

            if let Some(mut item) = classifier.classify(&record, &subject) {
                item.timestamp = item.timestamp.or(candidate.observed_at);
                tally.evidence.push(item);
            }
        }

        if tally.deadline_reached {
            warn!(
                "Deadline reached after examining {} of {} candidates",
                tally.examined,
                candidates.len()
            );
        }

        let report = build_report(&subject, &program, candidates.len(), tally, Utc::now());
        info!(
            "Balance change check complete. Found claims: {}, Total claims: {}, Checked: {}",
            report.has_interacted, report.profile.total_count, report.candidates_examined
        );
        Ok(report)
    }
}

fn build_report(
    subject: &Address,
    program: &Address,
    listed: usize,
    tally: ScanTally,
    as_of: DateTime<Utc>,
) -> ClaimReport {
    let profile = aggregate(&tally.evidence, DedupKey::Token);
    // Frequency counts every claim transaction, not only one per token
    let every_claim = aggregate(&tally.evidence, DedupKey::Transaction);
    let claim_transactions = every_claim.total_count;
    let primary = primary_claim(&profile.items).cloned();
    let has_interacted = !tally.evidence.is_empty();

    let status = match profile.total_count {
        0 => "No Fee Claims Found".to_string(),
        1 => "1 Fee Claim Found!".to_string(),
        n => format!("{} Fee Claims Found!", n),
    };

    ClaimReport {
        wallet: subject.to_string(),
        program: program.to_string(),
        has_interacted,
        status,
        candidates_listed: listed,
        candidates_examined: tally.examined,
        errors: tally.errors,
        deadline_reached: tally.deadline_reached,
        claim_transactions,
        found_in_tx: primary.as_ref().map(|item| item.source_id.clone()),
        primary_claim: primary,
        frequency: ClaimFrequency::of(&every_claim, as_of),
        profile,
        error: None,
    }
}
