//! Runtime configuration for the claim and risk pipelines.
//!
//! Everything network-facing is configured here: endpoints and credentials,
//! the rate-limit spacing and retry policy used by the detail resolver, the
//! scan bounds and the rule thresholds used by the risk scorer.

use crate::claims::classifier::TokenPattern;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Public mainnet RPC, used when no Helius key is configured.
pub const PUBLIC_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

/// Fee-share program whose claims are detected by default.
pub const DEFAULT_FEE_PROGRAM: &str = "FEEhPbKVKnco9EXnaY3i4R5rQVUx91wgVfu8qokixywi";

/// Hard ceiling on candidates listed per run.
pub const MAX_CANDIDATES_CEILING: usize = 500;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Ledger JSON-RPC endpoint
    pub rpc_url: String,
    /// Creator registry base URL
    pub registry_base_url: String,
    /// Creator registry API key
    pub registry_api_key: Option<String>,
    /// Heuristic scoring endpoint
    pub heuristic_api_url: String,
    /// Heuristic scoring API key
    pub heuristic_api_key: Option<String>,
    /// Model requested from the heuristic service
    pub heuristic_model: String,
    /// Reply token budget for the heuristic service
    pub heuristic_max_tokens: u32,
    /// Program whose claims are detected
    pub fee_program: String,
    /// Naming convention of claimable tokens
    pub token_pattern: TokenPattern,
    /// Per-request timeout in seconds
    pub request_timeout_seconds: u64,
    /// Spacing between ledger detail calls
    pub rate_limit: RateLimitConfig,
    /// Spacing between registry history calls, in milliseconds
    pub history_min_interval_ms: u64,
    /// Backoff policy for transient item failures
    pub retry: RetryPolicy,
    /// Signatures requested per listing page
    pub list_page_size: usize,
    /// Default scan bounds
    pub default_max_candidates: usize,
    pub default_max_elapsed_seconds: u64,
    /// Risk rule thresholds and deltas
    pub thresholds: RiskThresholds,
}

/// Minimum spacing between calls, adapted by the observed error rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub min_interval_ms: u64,
    pub error_window: usize,
    pub error_threshold: f64,
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Thresholds and score deltas of the rule-based red flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// Unverified creator royalty above this is a major flag
    pub unverified_high_royalty_bps: u32,
    pub unverified_high_royalty_delta: u8,
    /// Verified creator royalty below this is implausible
    pub verified_low_royalty_bps: u32,
    pub verified_low_royalty_delta: u8,
    /// Launch count above this marks a serial launcher
    pub serial_launch_count: u32,
    pub serial_launcher_delta: u8,
    pub no_verified_creators_delta: u8,
    /// Unverified share of all royalties, in percent
    pub unverified_share_pct: f64,
    pub unverified_share_delta: u8,
    /// Creator count above this is noted
    pub crowded_creator_count: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 160,
            error_window: 20,
            error_threshold: 0.2,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 4_000,
        }
    }
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            unverified_high_royalty_bps: 1_000,
            unverified_high_royalty_delta: 30,
            verified_low_royalty_bps: 500,
            verified_low_royalty_delta: 10,
            serial_launch_count: 5,
            serial_launcher_delta: 20,
            no_verified_creators_delta: 25,
            unverified_share_pct: 70.0,
            unverified_share_delta: 20,
            crowded_creator_count: 3,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            rpc_url: PUBLIC_RPC_URL.to_string(),
            registry_base_url: "https://public-api-v2.bags.fm/api/v1".to_string(),
            registry_api_key: None,
            heuristic_api_url: "https://api.anthropic.com/v1/messages".to_string(),
            heuristic_api_key: None,
            heuristic_model: "claude-3-5-sonnet-20241022".to_string(),
            heuristic_max_tokens: 1_000,
            fee_program: DEFAULT_FEE_PROGRAM.to_string(),
            token_pattern: TokenPattern::default(),
            request_timeout_seconds: 10,
            rate_limit: RateLimitConfig::default(),
            history_min_interval_ms: 200,
            retry: RetryPolicy::default(),
            list_page_size: 100,
            default_max_candidates: 50,
            default_max_elapsed_seconds: 25,
            thresholds: RiskThresholds::default(),
        }
    }
}

impl ScanConfig {
    /// Load configuration from the process environment, reading `.env`
    /// first when one exists.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Some(key) = env_var("HELIUS_API_KEY") {
            config.rpc_url = format!("https://mainnet.helius-rpc.com/?api-key={}", key);
        }
        if let Some(url) = env_var("SOLANA_RPC_URL") {
            config.rpc_url = url;
        }
        config.registry_api_key = env_var("BAGS_API_KEY");
        config.heuristic_api_key = env_var("ANTHROPIC_API_KEY");
        if let Some(model) = env_var("ANTHROPIC_MODEL") {
            config.heuristic_model = model;
        }
        if let Some(program) = env_var("FEE_PROGRAM") {
            config.fee_program = program;
        }
        if let Some(timeout) = env_var("REQUEST_TIMEOUT_SECONDS") {
            config.request_timeout_seconds = timeout
                .parse()
                .context("REQUEST_TIMEOUT_SECONDS must be a whole number of seconds")?;
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Whether the configured RPC is the rate-limited public endpoint.
    pub fn uses_public_rpc(&self) -> bool {
        self.rpc_url == PUBLIC_RPC_URL
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Builder for convenient construction with sensible defaults.
pub struct ConfigBuilder {
    config: ScanConfig,
}

impl ConfigBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: ScanConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.config.rpc_url = url.into();
        self
    }

    pub fn with_registry(mut self, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        self.config.registry_base_url = base_url.into();
        self.config.registry_api_key = api_key;
        self
    }

    pub fn with_heuristic(mut self, api_url: impl Into<String>, api_key: Option<String>) -> Self {
        self.config.heuristic_api_url = api_url.into();
        self.config.heuristic_api_key = api_key;
        self
    }

    pub fn with_fee_program(mut self, program: impl Into<String>) -> Self {
        self.config.fee_program = program.into();
        self
    }

    pub fn with_token_pattern(mut self, pattern: TokenPattern) -> Self {
        self.config.token_pattern = pattern;
        self
    }

    /// Set the minimum spacing between ledger detail calls.
    pub fn with_min_interval_ms(mut self, interval_ms: u64) -> Self {
        self.config.rate_limit.min_interval_ms = interval_ms;
        self
    }

    pub fn with_history_interval_ms(mut self, interval_ms: u64) -> Self {
        self.config.history_min_interval_ms = interval_ms;
        self
    }

    pub fn with_retry(
        mut self,
        max_retries: usize,
        initial_backoff_ms: u64,
        max_backoff_ms: u64,
    ) -> Self {
        self.config.retry = RetryPolicy {
            max_retries,
            initial_backoff_ms,
            max_backoff_ms,
        };
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.config.list_page_size = page_size;
        self
    }

    pub fn with_scan_bounds(mut self, max_candidates: usize, max_elapsed_seconds: u64) -> Self {
        self.config.default_max_candidates = max_candidates;
        self.config.default_max_elapsed_seconds = max_elapsed_seconds;
        self
    }

    pub fn with_thresholds(mut self, thresholds: RiskThresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    pub fn build(self) -> ScanConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
