//! claim-sentinel - Solana fee-claim detection and creator-royalty risk scoring
//!
//! Two pipelines share one shape: list candidates, resolve each under a rate
//! limit, classify, then aggregate. [`ClaimDetector`] scans a wallet's
//! history for fee claims from a program; [`RiskScorer`] scores a token's
//! creator table for signs of a LARP launch.

pub mod claims;
pub mod config;
pub mod error;
pub mod ledger;
pub mod rate_limit;
pub mod risk;
pub mod types;

// Re-export main types for convenience
pub use claims::{ClaimDetector, ClaimReport, ScanOptions};
pub use config::{ConfigBuilder, ScanConfig};
pub use error::{Result, ScanError};
pub use risk::{RiskReport, RiskScorer};
pub use types::{Address, CreatorRecord, EvidenceItem, Profile, Recommendation, RiskAssessment};
