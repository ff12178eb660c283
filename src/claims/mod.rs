//! Fee-claim detection: classification of resolved transactions, the
//! scan pipeline and aggregation of accepted claims.

pub mod aggregate;
pub mod classifier;
pub mod detector;

pub use aggregate::{aggregate, primary_claim, ClaimFrequency, DedupKey, FrequencyTier};
pub use classifier::{classify, EvidenceClassifier, TokenPattern};
pub use detector::{ClaimDetector, ClaimReport, ScanOptions};
