//! Core types and data structures for the claim-sentinel pipelines.

use crate::error::{Result, ScanError};
use chrono::{DateTime, Utc};
use nonempty::NonEmpty;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A base58 wallet, program or token address.
///
/// Addresses are opaque to the pipelines; the only validation applied is
/// that they are non-empty once trimmed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Parse a caller-supplied address, rejecting blank input.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ScanError::Validation("address must not be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Wrap an address read from an upstream payload without validation.
    pub(crate) fn from_upstream(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..10).unwrap_or(&self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Address {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Address {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Lightweight pointer to a transaction, as returned by the lister.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRef {
    /// Transaction signature
    pub id: String,
    /// Block time reported by the listing, when known
    pub observed_at: Option<DateTime<Utc>>,
}

impl CandidateRef {
    pub fn new(id: impl Into<String>, observed_at: Option<DateTime<Utc>>) -> Self {
        Self {
            id: id.into(),
            observed_at,
        }
    }
}

/// Fully resolved transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailRecord {
    /// Transaction signature
    pub id: String,
    /// Required signers in message order; the head is the fee payer
    pub signers: NonEmpty<Address>,
    /// Every account the transaction touches, static keys first, then
    /// address-table writable and readonly keys
    pub account_keys: Vec<Address>,
    /// Programs invoked by the top-level instructions
    pub referenced_programs: BTreeSet<Address>,
    /// Lamport change per account index (post - pre)
    pub balance_deltas: BTreeMap<usize, i64>,
    /// Block time, when the ledger reports one
    pub block_time: Option<DateTime<Utc>>,
}

impl DetailRecord {
    /// The fee-paying signer.
    pub fn fee_payer(&self) -> &Address {
        &self.signers.head
    }

    /// Balance delta of the account at `index`, zero when unknown.
    pub fn delta_at(&self, index: usize) -> i64 {
        self.balance_deltas.get(&index).copied().unwrap_or(0)
    }
}

/// How the program of interest showed up in a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramInvolvement {
    /// Listed among the transaction's account keys
    AccountKey,
    /// Only resolved as the program of an instruction
    Instruction,
}

/// Facts recorded alongside an accepted claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceExtra {
    pub involvement: ProgramInvolvement,
    /// Number of accounts whose balance increased
    pub credited_accounts: usize,
    /// Largest single positive delta, in lamports
    pub largest_credit_lamports: i64,
}

/// A transaction accepted as a fee claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub source_id: String,
    pub subject_token: Option<Address>,
    /// Amount credited to the claimant, in SOL
    pub claimed_amount: Option<Decimal>,
    pub timestamp: Option<DateTime<Utc>>,
    pub extra: EvidenceExtra,
}

/// Aggregate over the accepted evidence for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub total_count: usize,
    pub total_amount: Decimal,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub items: Vec<EvidenceItem>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            total_count: 0,
            total_amount: Decimal::ZERO,
            first_timestamp: None,
            last_timestamp: None,
            items: Vec::new(),
        }
    }
}

/// Royalty allocation for one creator of a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorRecord {
    pub wallet: Address,
    pub is_verified_creator: bool,
    /// Basis points of fee revenue, 0..=10000 per record
    pub royalty_share_bps: u32,
    pub historical_launch_count: u32,
    pub username: Option<String>,
    pub twitter_username: Option<String>,
}

impl CreatorRecord {
    /// Best display handle for flag messages.
    pub fn handle(&self) -> String {
        match (&self.twitter_username, &self.username) {
            (Some(twitter), _) if !twitter.is_empty() => format!("@{}", twitter),
            (_, Some(name)) if !name.is_empty() => format!("@{}", name),
            _ => self.wallet.short().to_string(),
        }
    }

    pub fn royalty_percent(&self) -> f64 {
        self.royalty_share_bps as f64 / 100.0
    }
}

/// Recommendation band derived from a final risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    LowRisk,
    Moderate,
    Caution,
    Avoid,
}

impl Recommendation {
    /// Band a final score: 75+ avoid, 50+ caution, 25+ moderate.
    pub fn from_score(score: u8) -> Self {
        match score {
            75..=u8::MAX => Recommendation::Avoid,
            50..=74 => Recommendation::Caution,
            25..=49 => Recommendation::Moderate,
            _ => Recommendation::LowRisk,
        }
    }

    /// Lenient parse of a free-text label such as `"low_risk"` or `"AVOID"`.
    pub fn parse_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c.to_ascii_uppercase() })
            .collect();
        match normalized.as_str() {
            "AVOID" => Some(Recommendation::Avoid),
            "CAUTION" => Some(Recommendation::Caution),
            "MODERATE" => Some(Recommendation::Moderate),
            "LOW_RISK" | "LOW" => Some(Recommendation::LowRisk),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Avoid => "AVOID",
            Recommendation::Caution => "CAUTION",
            Recommendation::Moderate => "MODERATE",
            Recommendation::LowRisk => "LOW_RISK",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final risk verdict for a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Final score, 0-100
    pub score: u8,
    pub red_flags: Vec<String>,
    pub recommendation: Recommendation,
    /// Score reported by the heuristic service before rule deltas
    pub base_score: u8,
    /// Free-text rationale from the heuristic service
    pub analysis: String,
    /// The heuristic service's own label, kept for reference only
    pub heuristic_recommendation: Option<Recommendation>,
}
