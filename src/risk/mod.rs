//! Token creator-royalty risk scoring.

pub mod decoder;
pub mod flags;
pub mod heuristic;
pub mod registry;
pub mod scorer;

pub use decoder::{decode_or_fallback, decode_verdict, HeuristicVerdict};
pub use flags::{detect_red_flags, RedFlag, RedFlagKind, RoyaltySummary};
pub use heuristic::{build_prompt, AnthropicScorer, HeuristicScorer};
pub use registry::{BagsRegistry, CreatorRegistry};
pub use scorer::{combine, RiskMetadata, RiskReport, RiskScorer};
