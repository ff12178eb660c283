//! Rule-based red-flag detectors over a token's creator table.
//!
//! Each detector is a pure function of the creators and thresholds and
//! contributes a fixed delta to the final score.

use crate::config::RiskThresholds;
use crate::types::CreatorRecord;
use serde::{Deserialize, Serialize};

/// Upper bound of the royalty table, 100% in basis points.
pub const MAX_TOTAL_ROYALTY_BPS: u64 = 10_000;

pub const NO_VERIFIED_CREATORS_FLAG: &str =
    "CRITICAL: No verified creators found - likely LARP token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedFlagKind {
    UnverifiedHighRoyalty,
    VerifiedLowRoyalty,
    SerialLauncher,
    CrowdedCreatorTable,
    NoVerifiedCreators,
    UnverifiedRoyaltyMajority,
    RoyaltyOverallocated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedFlag {
    pub kind: RedFlagKind,
    pub message: String,
    /// Added to the base score; zero for informational flags
    pub delta: u8,
}

impl RedFlag {
    fn new(kind: RedFlagKind, message: String, delta: u8) -> Self {
        Self { kind, message, delta }
    }
}

/// Royalty statistics of one creator table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoyaltySummary {
    pub total_creators: usize,
    pub verified_creators: usize,
    pub total_royalty_bps: u64,
    pub unverified_royalty_bps: u64,
    /// Unverified share of the total, in percent; zero for an empty table
    pub unverified_royalty_pct: f64,
    pub average_royalty_bps: f64,
    pub serial_launchers: usize,
    pub highest_launch_count: u32,
}

impl RoyaltySummary {
    pub fn of(creators: &[CreatorRecord], thresholds: &RiskThresholds) -> Self {
        let total_royalty_bps: u64 = creators.iter().map(|c| c.royalty_share_bps as u64).sum();
        let unverified_royalty_bps: u64 = creators
            .iter()
            .filter(|c| !c.is_verified_creator)
            .map(|c| c.royalty_share_bps as u64)
            .sum();

        let unverified_royalty_pct = if total_royalty_bps > 0 {
            unverified_royalty_bps as f64 / total_royalty_bps as f64 * 100.0
        } else {
            0.0
        };
        let average_royalty_bps = if creators.is_empty() {
            0.0
        } else {
            total_royalty_bps as f64 / creators.len() as f64
        };

        Self {
            total_creators: creators.len(),
            verified_creators: creators.iter().filter(|c| c.is_verified_creator).count(),
            total_royalty_bps,
            unverified_royalty_bps,
            unverified_royalty_pct,
            average_royalty_bps,
            serial_launchers: creators
                .iter()
                .filter(|c| c.historical_launch_count > thresholds.serial_launch_count)
                .count(),
            highest_launch_count: creators
                .iter()
                .map(|c| c.historical_launch_count)
                .max()
                .unwrap_or(0),
        }
    }
}

pub fn unverified_high_royalty(creators: &[CreatorRecord], t: &RiskThresholds) -> Option<RedFlag> {
    let offenders: Vec<String> = creators
        .iter()
        .filter(|c| !c.is_verified_creator && c.royalty_share_bps > t.unverified_high_royalty_bps)
        .map(|c| format!("{} ({:.1}%)", c.handle(), c.royalty_percent()))
        .collect();
    if offenders.is_empty() {
        return None;
    }
    Some(RedFlag::new(
        RedFlagKind::UnverifiedHighRoyalty,
        format!(
            "MAJOR RED FLAG: {} unverified creator(s) receiving high royalties: {}",
            offenders.len(),
            offenders.join(", ")
        ),
        t.unverified_high_royalty_delta,
    ))
}

pub fn verified_low_royalty(creators: &[CreatorRecord], t: &RiskThresholds) -> Option<RedFlag> {
    let any = creators
        .iter()
        .any(|c| c.is_verified_creator && c.royalty_share_bps < t.verified_low_royalty_bps);
    any.then(|| {
        RedFlag::new(
            RedFlagKind::VerifiedLowRoyalty,
            format!(
                "Verified creator(s) receiving suspiciously low royalties (< {}%) - possible LARP",
                t.verified_low_royalty_bps as f64 / 100.0
            ),
            t.verified_low_royalty_delta,
        )
    })
}

pub fn serial_launchers(creators: &[CreatorRecord], t: &RiskThresholds) -> Option<RedFlag> {
    let launchers: Vec<String> = creators
        .iter()
        .filter(|c| c.historical_launch_count > t.serial_launch_count)
        .map(|c| format!("{} ({} tokens)", c.handle(), c.historical_launch_count))
        .collect();
    if launchers.is_empty() {
        return None;
    }
    Some(RedFlag::new(
        RedFlagKind::SerialLauncher,
        format!("Serial token launcher(s) detected: {}", launchers.join(", ")),
        t.serial_launcher_delta,
    ))
}

pub fn crowded_creator_table(creators: &[CreatorRecord], t: &RiskThresholds) -> Option<RedFlag> {
    (creators.len() > t.crowded_creator_count).then(|| {
        RedFlag::new(
            RedFlagKind::CrowdedCreatorTable,
            format!(
                "High number of creators ({}) suggests potential money grab",
                creators.len()
            ),
            0,
        )
    })
}

pub fn no_verified_creators(creators: &[CreatorRecord], t: &RiskThresholds) -> Option<RedFlag> {
    (!creators.iter().any(|c| c.is_verified_creator)).then(|| {
        RedFlag::new(
            RedFlagKind::NoVerifiedCreators,
            NO_VERIFIED_CREATORS_FLAG.to_string(),
            t.no_verified_creators_delta,
        )
    })
}

pub fn unverified_royalty_majority(
    summary: &RoyaltySummary,
    t: &RiskThresholds,
) -> Option<RedFlag> {
    (summary.unverified_royalty_pct > t.unverified_share_pct).then(|| {
        RedFlag::new(
            RedFlagKind::UnverifiedRoyaltyMajority,
            format!(
                "{:.1}% of royalties going to unverified creators - major LARP indicator",
                summary.unverified_royalty_pct
            ),
            t.unverified_share_delta,
        )
    })
}

pub fn royalty_overallocated(summary: &RoyaltySummary) -> Option<RedFlag> {
    (summary.total_royalty_bps > MAX_TOTAL_ROYALTY_BPS).then(|| {
        RedFlag::new(
            RedFlagKind::RoyaltyOverallocated,
            format!(
                "Royalty shares total {} bps, above the {} bps maximum",
                summary.total_royalty_bps, MAX_TOTAL_ROYALTY_BPS
            ),
            0,
        )
    })
}

/// Run every detector in a fixed order.
pub fn detect_red_flags(creators: &[CreatorRecord], thresholds: &RiskThresholds) -> Vec<RedFlag> {
    let summary = RoyaltySummary::of(creators, thresholds);

    [
        unverified_high_royalty(creators, thresholds),
        verified_low_royalty(creators, thresholds),
        serial_launchers(creators, thresholds),
        crowded_creator_table(creators, thresholds),
        no_verified_creators(creators, thresholds),
        unverified_royalty_majority(&summary, thresholds),
        royalty_overallocated(&summary),
    ]
    .into_iter()
    .flatten()
    .collect()
}

pub fn total_delta(flags: &[RedFlag]) -> u32 {
    flags.iter().map(|flag| flag.delta as u32).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;

    fn creator(wallet: &str, verified: bool, bps: u32, launches: u32) -> CreatorRecord {
        CreatorRecord {
            wallet: Address::parse(wallet).unwrap(),
            is_verified_creator: verified,
            royalty_share_bps: bps,
            historical_launch_count: launches,
            username: Some(wallet.to_lowercase()),
            twitter_username: None,
        }
    }

    fn kinds(flags: &[RedFlag]) -> Vec<RedFlagKind> {
        flags.iter().map(|f| f.kind).collect()
    }

    #[test]
    fn test_clean_table_has_no_flags() {
        let creators = vec![creator("Real", true, 9_000, 1), creator("Partner", false, 1_000, 0)];

        assert!(detect_red_flags(&creators, &RiskThresholds::default()).is_empty());
    }

    #[test]
    fn test_larp_pattern_triggers_major_flags() {
        let creators = vec![
            creator("Celebrity", true, 100, 0),
            creator("Random", false, 8_000, 12),
        ];

        let flags = detect_red_flags(&creators, &RiskThresholds::default());

        assert_eq!(
            kinds(&flags),
            vec![
                RedFlagKind::UnverifiedHighRoyalty,
                RedFlagKind::VerifiedLowRoyalty,
                RedFlagKind::SerialLauncher,
                RedFlagKind::UnverifiedRoyaltyMajority,
            ]
        );
        assert_eq!(total_delta(&flags), 30 + 10 + 20 + 20);
        assert!(flags[0].message.contains("@random (80.0%)"));
        assert!(flags[2].message.contains("@random (12 tokens)"));
    }

    #[test]
    fn test_no_verified_creators() {
        let creators = vec![creator("A", false, 500, 0), creator("B", false, 500, 0)];

        let flags = detect_red_flags(&creators, &RiskThresholds::default());

        assert!(flags.iter().any(|f| f.message == NO_VERIFIED_CREATORS_FLAG && f.delta == 25));
    }

    #[test]
    fn test_empty_table_flags_missing_verification_only() {
        let flags = detect_red_flags(&[], &RiskThresholds::default());

        assert_eq!(kinds(&flags), vec![RedFlagKind::NoVerifiedCreators]);
        let summary = RoyaltySummary::of(&[], &RiskThresholds::default());
        assert_eq!(summary.average_royalty_bps, 0.0);
        assert_eq!(summary.unverified_royalty_pct, 0.0);
    }

    #[test]
    fn test_thresholds_are_strict() {
        let t = RiskThresholds::default();
        let creators = vec![creator("V", true, 500, 5), creator("U", false, 1_000, 0)];

        assert!(unverified_high_royalty(&creators, &t).is_none());
        assert!(verified_low_royalty(&creators, &t).is_none());
        assert!(serial_launchers(&creators, &t).is_none());
    }

    #[test]
    fn test_informational_flags_carry_no_delta() {
        let creators = vec![
            creator("A", true, 4_000, 0),
            creator("B", true, 4_000, 0),
            creator("C", true, 4_000, 0),
            creator("D", true, 4_000, 0),
        ];

        let flags = detect_red_flags(&creators, &RiskThresholds::default());

        assert_eq!(
            kinds(&flags),
            vec![RedFlagKind::CrowdedCreatorTable, RedFlagKind::RoyaltyOverallocated]
        );
        assert_eq!(total_delta(&flags), 0);
    }

    #[test]
    fn test_summary_statistics() {
        let creators = vec![creator("A", true, 2_000, 3), creator("B", false, 6_000, 9)];

        let summary = RoyaltySummary::of(&creators, &RiskThresholds::default());

        assert_eq!(summary.total_creators, 2);
        assert_eq!(summary.verified_creators, 1);
        assert_eq!(summary.total_royalty_bps, 8_000);
        assert_eq!(summary.average_royalty_bps, 4_000.0);
        assert!((summary.unverified_royalty_pct - 75.0).abs() < 1e-9);
        assert_eq!(summary.serial_launchers, 1);
        assert_eq!(summary.highest_launch_count, 9);
    }
}
