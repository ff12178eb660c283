//! Token risk scoring.
//!
//! Combines the heuristic service's verdict with rule-based red flags:
//! `score = min(100, base + sum(deltas))`, and the recommendation is banded
//! from that final score.

use crate::config::ScanConfig;
use crate::error::{Result, ScanError};
use crate::rate_limit::AdaptiveRateLimiter;
use crate::risk::decoder::{decode_or_fallback, HeuristicVerdict, FALLBACK_BASE_SCORE};
use crate::risk::flags::{detect_red_flags, total_delta, RedFlag, RoyaltySummary};
use crate::risk::heuristic::{build_prompt, AnthropicScorer, HeuristicScorer};
use crate::risk::registry::{BagsRegistry, CreatorRegistry};
use crate::types::{Address, CreatorRecord, Recommendation, RiskAssessment};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{info, instrument, warn};

pub const MAX_SCORE: u32 = 100;

/// Merge a verdict and rule flags into the final assessment. Heuristic
/// flags come first, rule flags after them in detector order.
pub fn combine(verdict: &HeuristicVerdict, flags: &[RedFlag]) -> RiskAssessment {
    let score = (verdict.base_score as u32 + total_delta(flags)).min(MAX_SCORE) as u8;

    let red_flags = verdict
        .red_flags
        .iter()
        .cloned()
        .chain(flags.iter().map(|flag| flag.message.clone()))
        .collect();

    RiskAssessment {
        score,
        red_flags,
        recommendation: Recommendation::from_score(score),
        base_score: verdict.base_score,
        analysis: verdict.analysis.clone(),
        heuristic_recommendation: verdict.recommendation,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetadata {
    pub total_creators: usize,
    pub verified_creators: usize,
    pub average_royalty_bps: f64,
    pub total_royalty_bps: u64,
    pub unverified_royalty_pct: f64,
    pub serial_launchers_detected: usize,
    pub highest_launch_count: u32,
    /// Creators whose launch history was looked up
    pub creators_examined: usize,
    /// History lookups that failed and counted as zero launches
    pub history_errors: usize,
    pub deadline_reached: bool,
}

/// Result of one risk assessment, complete even for failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReport {
    pub token: String,
    pub assessment: RiskAssessment,
    pub creators: Vec<CreatorRecord>,
    pub metadata: RiskMetadata,
    pub error: Option<String>,
}

impl RiskReport {
    pub fn failed(token: &str, err: &ScanError) -> Self {
        let message = format!("Risk check failed: {}", err);
        Self {
            token: token.to_string(),
            assessment: RiskAssessment {
                score: FALLBACK_BASE_SCORE,
                red_flags: Vec::new(),
                recommendation: Recommendation::from_score(FALLBACK_BASE_SCORE),
                base_score: FALLBACK_BASE_SCORE,
                analysis: message.clone(),
                heuristic_recommendation: None,
            },
            creators: Vec::new(),
            metadata: RiskMetadata::default(),
            error: Some(message),
        }
    }
}

#[derive(Default)]
struct HistoryTally {
    examined: usize,
    errors: usize,
    deadline_reached: bool,
}

pub struct RiskScorer {
    registry: Arc<dyn CreatorRegistry>,
    heuristic: Arc<dyn HeuristicScorer>,
    config: ScanConfig,
}

impl RiskScorer {
    pub fn new(
        registry: Arc<dyn CreatorRegistry>,
        heuristic: Arc<dyn HeuristicScorer>,
        config: ScanConfig,
    ) -> Self {
        Self {
            registry,
            heuristic,
            config,
        }
    }

    /// Scorer backed by the Bags registry and the Anthropic messages API.
    pub fn with_http(config: ScanConfig) -> Result<Self> {
        let http_client = Client::builder().build()?;
        let registry = BagsRegistry::new(
            http_client.clone(),
            config.registry_base_url.clone(),
            config.registry_api_key.clone(),
            config.request_timeout(),
        );
        let heuristic = AnthropicScorer::new(
            http_client,
            config.heuristic_api_url.clone(),
            config.heuristic_api_key.clone(),
            config.heuristic_model.clone(),
            config.heuristic_max_tokens,
            config.request_timeout(),
        );
        Ok(Self::new(Arc::new(registry), Arc::new(heuristic), config))
    }

    pub fn registry(&self) -> &Arc<dyn CreatorRegistry> {
        &self.registry
    }

    /// Score a creator table. Never fails: an unusable heuristic reply
    /// degrades to the fallback verdict.
    #[instrument(skip(self, token, creators), fields(token = %token, creators = creators.len()))]
    pub async fn score(&self, token: &Address, creators: &[CreatorRecord]) -> RiskAssessment {
        self.score_until(token, creators, None).await.0
    }

    /// Fetch the creator table and launch histories for `token` and score it
    /// within `max_elapsed`.
    ///
    /// Fails on invalid input or when the creator table cannot be fetched.
    #[instrument(skip(self))]
    pub async fn assess_risk(&self, token: &str, max_elapsed: Duration) -> Result<RiskReport> {
        let token = Address::parse(token)?;
        if max_elapsed.is_zero() {
            return Err(ScanError::Validation("max_elapsed must be positive".to_string()));
        }
        let deadline = Instant::now() + max_elapsed;
        info!("Checking LARP risk for token: {}", token);

        let mut creators = match timeout_at(deadline, self.registry.creators(&token)).await {
            Ok(fetched) => fetched.map_err(|err| match err {
                ScanError::ParseFailure(detail) => {
                    warn!("Unreadable creator table: {}", detail);
                    ScanError::UpstreamUnavailable(
                        "Bags API returned a malformed creator table".to_string(),
                    )
                }
                other => other,
            })?,
            Err(_) => {
                warn!("Deadline reached before the creator table was fetched");
                let verdict = HeuristicVerdict::fallback(
                    "Deadline reached before the creator table was fetched",
                );
                return Ok(RiskReport {
                    token: token.to_string(),
                    assessment: combine(&verdict, &[]),
                    creators: Vec::new(),
                    metadata: RiskMetadata {
                        deadline_reached: true,
                        ..RiskMetadata::default()
                    },
                    error: None,
                });
            }
        };

        let tally = self.attach_launch_history(&mut creators, deadline).await;
        let (assessment, heuristic_timed_out) =
            self.score_until(&token, &creators, Some(deadline)).await;

        let summary = RoyaltySummary::of(&creators, &self.config.thresholds);
        let metadata = RiskMetadata {
            total_creators: summary.total_creators,
            verified_creators: summary.verified_creators,
            average_royalty_bps: summary.average_royalty_bps,
            total_royalty_bps: summary.total_royalty_bps,
            unverified_royalty_pct: summary.unverified_royalty_pct,
            serial_launchers_detected: summary.serial_launchers,
            highest_launch_count: summary.highest_launch_count,
            creators_examined: tally.examined,
            history_errors: tally.errors,
            deadline_reached: tally.deadline_reached || heuristic_timed_out,
        };

        info!(
            "LARP check complete. Score: {} ({}), {} red flags",
            assessment.score,
            assessment.recommendation,
            assessment.red_flags.len()
        );

        Ok(RiskReport {
            token: token.to_string(),
            assessment,
            creators,
            metadata,
            error: None,
        })
    }

    /// Look up each creator's launch count, one call at a time.
    async fn attach_launch_history(
        &self,
        creators: &mut [CreatorRecord],
        deadline: Instant,
    ) -> HistoryTally {
        let interval = Duration::from_millis(self.config.history_min_interval_ms);
        let limiter = AdaptiveRateLimiter::fixed(interval);
        let mut known: HashMap<Address, u32> = HashMap::new();
        let mut tally = HistoryTally::default();

        for creator in creators.iter_mut() {
            if Instant::now() >= deadline {
                tally.deadline_reached = true;
                break;
            }

            if let Some(count) = known.get(&creator.wallet) {
                creator.historical_launch_count = *count;
                tally.examined += 1;
                continue;
            }

            let lookup = async {
                limiter.acquire().await;
                self.registry.launch_count(&creator.wallet).await
            };

            let count = match timeout_at(deadline, lookup).await {
                Err(_) => {
                    tally.deadline_reached = true;
                    break;
                }
                Ok(Ok(count)) => count,
                Ok(Err(err)) => {
                    warn!("Could not fetch history for {}: {}", creator.wallet, err);
                    tally.errors += 1;
                    0
                }
            };

            creator.historical_launch_count = count;
            known.insert(creator.wallet.clone(), count);
            tally.examined += 1;
        }

        if tally.deadline_reached {
            warn!(
                "Deadline reached after {} of {} history lookups",
                tally.examined,
                creators.len()
            );
        }
        tally
    }

    /// Returns the assessment and whether the heuristic call hit the deadline.
    async fn score_until(
        &self,
        token: &Address,
        creators: &[CreatorRecord],
        deadline: Option<Instant>,
    ) -> (RiskAssessment, bool) {
        let prompt = build_prompt(token, creators);

        let (reply, timed_out) = match deadline {
            Some(deadline) => match timeout_at(deadline, self.heuristic.complete(&prompt)).await {
                Ok(reply) => (reply, false),
                Err(_) => (
                    Err(ScanError::UpstreamUnavailable(
                        "deadline reached before the heuristic reply".to_string(),
                    )),
                    true,
                ),
            },
            None => (self.heuristic.complete(&prompt).await, false),
        };

        let verdict = match reply {
            Ok(raw) => decode_or_fallback(&raw),
            Err(err) => {
                warn!("Heuristic scoring unavailable: {}", err);
                HeuristicVerdict::fallback(&format!("Heuristic scoring unavailable: {}", err))
            }
        };

        let flags = detect_red_flags(creators, &self.config.thresholds);
        (combine(&verdict, &flags), timed_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::flags::RedFlagKind;

    fn verdict(base: u8) -> HeuristicVerdict {
        HeuristicVerdict {
            base_score: base,
            analysis: "analysis".to_string(),
            red_flags: vec!["from heuristic".to_string()],
            recommendation: Some(Recommendation::LowRisk),
        }
    }

    fn flag(delta: u8) -> RedFlag {
        RedFlag {
            kind: RedFlagKind::SerialLauncher,
            message: format!("rule +{}", delta),
            delta,
        }
    }

    #[test]
    fn test_combine_adds_deltas_and_orders_flags() {
        let assessment = combine(&verdict(20), &[flag(10), flag(25)]);

        assert_eq!(assessment.score, 55);
        assert_eq!(assessment.base_score, 20);
        assert_eq!(assessment.recommendation, Recommendation::Caution);
        assert_eq!(assessment.heuristic_recommendation, Some(Recommendation::LowRisk));
        assert_eq!(assessment.red_flags, vec!["from heuristic", "rule +10", "rule +25"]);
    }

    #[test]
    fn test_combine_clamps_to_hundred() {
        let flags = vec![flag(30), flag(30), flag(30), flag(30)];

        let assessment = combine(&verdict(90), &flags);

        assert_eq!(assessment.score, 100);
        assert_eq!(assessment.recommendation, Recommendation::Avoid);
    }

    #[test]
    fn test_recommendation_ignores_heuristic_label() {
        let assessment = combine(&verdict(10), &[]);

        assert_eq!(assessment.recommendation, Recommendation::LowRisk);
        let assessment = combine(&verdict(80), &[]);
        assert_eq!(assessment.recommendation, Recommendation::Avoid);
        assert_eq!(assessment.heuristic_recommendation, Some(Recommendation::LowRisk));
    }

    #[test]
    fn test_failed_report_shape() {
        let err = ScanError::NotFound("Token not found in Bags system".into());
        let report = RiskReport::failed("Token1", &err);

        assert_eq!(report.assessment.score, 50);
        assert_eq!(report.assessment.base_score, 50);
        assert_eq!(
            report.assessment.recommendation,
            Recommendation::from_score(report.assessment.score)
        );
        assert!(report.creators.is_empty());
        assert_eq!(report.metadata, RiskMetadata::default());
        assert!(report.error.unwrap().contains("Token not found"));
    }
}
