//! Deduplication and aggregation of accepted claims into a profile.

use crate::types::{Address, EvidenceItem, Profile};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Which field identifies duplicate evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupKey {
    /// One entry per claimed token. Items without a token are kept once
    /// per transaction.
    Token,
    /// One entry per transaction, regardless of token.
    Transaction,
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum ItemKey<'a> {
    Token(&'a Address),
    Source(&'a str),
}

fn key_of(item: &EvidenceItem, key: DedupKey) -> ItemKey<'_> {
    match (key, &item.subject_token) {
        (DedupKey::Token, Some(token)) => ItemKey::Token(token),
        _ => ItemKey::Source(&item.source_id),
    }
}

/// Fold evidence, in scan order, into a profile keeping the first
/// occurrence of each key.
pub fn aggregate(items: &[EvidenceItem], key: DedupKey) -> Profile {
    let (_, profile) = items.iter().fold(
        (HashSet::new(), Profile::default()),
        |(mut seen, mut profile), item| {
            if seen.insert(key_of(item, key)) {
                profile.total_count += 1;
                profile.total_amount += item.claimed_amount.unwrap_or(Decimal::ZERO);
                if let Some(ts) = item.timestamp {
                    profile.first_timestamp =
                        Some(profile.first_timestamp.map_or(ts, |first| first.min(ts)));
                    profile.last_timestamp =
                        Some(profile.last_timestamp.map_or(ts, |last| last.max(ts)));
                }
                profile.items.push(item.clone());
            }
            (seen, profile)
        },
    );
    profile
}

/// Largest claim by amount; ties go to the earliest in scan order.
pub fn primary_claim(items: &[EvidenceItem]) -> Option<&EvidenceItem> {
    items.iter().fold(None, |best: Option<&EvidenceItem>, item| match best {
        Some(current)
            if item.claimed_amount.unwrap_or_default()
                <= current.claimed_amount.unwrap_or_default() =>
        {
            Some(current)
        }
        _ => Some(item),
    })
}

/// Named claim-rate tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyTier {
    None,
    Rare,
    Occasional,
    Active,
    VeryActive,
}

impl FrequencyTier {
    pub fn from_rate(claims_per_day: f64) -> Self {
        if claims_per_day > 0.5 {
            FrequencyTier::VeryActive
        } else if claims_per_day > 0.1 {
            FrequencyTier::Active
        } else if claims_per_day > 0.03 {
            FrequencyTier::Occasional
        } else {
            FrequencyTier::Rare
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FrequencyTier::None => "none",
            FrequencyTier::Rare => "rare",
            FrequencyTier::Occasional => "occasional",
            FrequencyTier::Active => "active",
            FrequencyTier::VeryActive => "very active",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClaimFrequency {
    pub tier: FrequencyTier,
    pub claims_per_day: f64,
}

impl ClaimFrequency {
    /// Rate of claims since the first one, measured at `as_of`. Spans
    /// shorter than a day count as one day; profiles without timing
    /// information rate as rare.
    pub fn of(profile: &Profile, as_of: DateTime<Utc>) -> Self {
        if profile.total_count == 0 {
            return Self {
                tier: FrequencyTier::None,
                claims_per_day: 0.0,
            };
        }
        let Some(first) = profile.first_timestamp else {
            return Self {
                tier: FrequencyTier::Rare,
                claims_per_day: 0.0,
            };
        };

        let days = ((as_of - first).num_seconds() as f64 / SECONDS_PER_DAY).max(1.0);
        let claims_per_day = profile.total_count as f64 / days;
        Self {
            tier: FrequencyTier::from_rate(claims_per_day),
            claims_per_day,
        }
    }
}

impl Default for ClaimFrequency {
    fn default() -> Self {
        Self {
            tier: FrequencyTier::None,
            claims_per_day: 0.0,
        }
    }
}
