//! Error taxonomy shared by the claim and risk pipelines.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ScanError {
    /// Missing or invalid input, rejected before any network call.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// A stage-wide upstream call failed; the run cannot continue.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// A single item could not be resolved; callers skip it.
    #[error("Item {id} unavailable: {reason}")]
    ItemUnavailable {
        id: String,
        reason: String,
        retryable: bool,
    },

    /// An external response could not be decoded.
    #[error("Parse failure: {0}")]
    ParseFailure(String),

    /// The registry does not know the requested subject.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl ScanError {
    pub fn item(id: impl Into<String>, reason: impl Into<String>, retryable: bool) -> Self {
        ScanError::ItemUnavailable {
            id: id.into(),
            reason: reason.into(),
            retryable,
        }
    }

    /// Whether a bounded retry may succeed where this attempt failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScanError::ItemUnavailable { retryable: true, .. })
    }

    /// Failures that end an operation instead of degrading it.
    pub fn is_surfaced(&self) -> bool {
        matches!(
            self,
            ScanError::Validation(_) | ScanError::UpstreamUnavailable(_) | ScanError::NotFound(_)
        )
    }
}

impl From<reqwest::Error> for ScanError {
    fn from(err: reqwest::Error) -> Self {
        ScanError::UpstreamUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        ScanError::ParseFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
