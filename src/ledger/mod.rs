//! Ledger access: listing candidate transactions for an address and
//! resolving each one into a full record.

pub mod lister;
pub mod resolver;
pub mod rpc;

use crate::error::Result;
use crate::types::{Address, CandidateRef, DetailRecord};
use async_trait::async_trait;

pub use lister::PaginatedLister;
pub use resolver::DetailResolver;
pub use rpc::RpcLedger;

/// Remote ledger collaborator.
#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// One page of signatures for `address`, newest first, strictly older
    /// than `before` when a cursor is given.
    async fn signatures_for_address(
        &self,
        address: &Address,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<CandidateRef>>;

    /// Full record for one transaction. Every failure is reported as
    /// `ScanError::ItemUnavailable`.
    async fn transaction(&self, id: &str) -> Result<DetailRecord>;
}
