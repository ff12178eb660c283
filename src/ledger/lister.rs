//! Paginated listing of candidate transactions for an address.

use crate::config::MAX_CANDIDATES_CEILING;
use crate::error::{Result, ScanError};
use crate::ledger::LedgerApi;
use crate::types::{Address, CandidateRef};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Lists signatures newest first, following the `before` cursor across
/// pages until `limit` candidates are collected or history runs out.
pub struct PaginatedLister {
    ledger: Arc<dyn LedgerApi>,
    page_size: usize,
}

impl PaginatedLister {
    pub fn new(ledger: Arc<dyn LedgerApi>, page_size: usize) -> Self {
        Self {
            ledger,
            page_size: page_size.max(1),
        }
    }

    /// List up to `limit` candidates for `address`.
    ///
    /// An address without history yields an empty list. Any upstream
    /// failure aborts the listing with `UpstreamUnavailable`; there is no
    /// retry at this layer.
    #[instrument(skip(self, address), fields(address = %address))]
    pub async fn list(&self, address: &Address, limit: usize) -> Result<Vec<CandidateRef>> {
        if limit == 0 || limit > MAX_CANDIDATES_CEILING {
            return Err(ScanError::Validation(format!(
                "limit must be between 1 and {}, got {}",
                MAX_CANDIDATES_CEILING, limit
            )));
        }

        let mut candidates: Vec<CandidateRef> = Vec::with_capacity(limit);
        let mut seen: HashSet<String> = HashSet::new();
        let mut cursor: Option<String> = None;

        while candidates.len() < limit {
            let want = (limit - candidates.len()).min(self.page_size);
            let page = self
                .ledger
                .signatures_for_address(address, want, cursor.as_deref())
                .await?;
            let page_len = page.len();

            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.id.clone());

            let previous = candidates.len();
            for candidate in page {
                if candidates.len() == limit {
                    break;
                }
                if seen.insert(candidate.id.clone()) {
                    candidates.push(candidate);
                }
            }

            debug!("Listed page of {} signatures ({} total)", page_len, candidates.len());
            if candidates.len() == previous {
                warn!("Listing page added no new signatures, stopping");
                break;
            }
            if page_len < want {
                break;
            }
        }

        info!("Got {} wallet transactions", candidates.len());
        Ok(candidates)
    }
}
