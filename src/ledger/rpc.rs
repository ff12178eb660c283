//! Solana JSON-RPC ledger client.
//!
//! Speaks `getSignaturesForAddress` and `getTransaction` (json encoding,
//! versioned transactions allowed) over plain HTTP and decodes the replies
//! into the pipeline's own record types.

use crate::error::{Result, ScanError};
use crate::ledger::LedgerApi;
use crate::types::{Address, CandidateRef, DetailRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nonempty::NonEmpty;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, instrument};

/// JSON-RPC error codes that signal throttling or a lagging node.
const RETRYABLE_RPC_CODES: &[i64] = &[-32429, -32005, -32004];

/// Ledger client over a single JSON-RPC endpoint.
pub struct RpcLedger {
    http_client: Client,
    rpc_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Why a JSON-RPC call failed, before it is mapped to the caller's error.
#[derive(Debug)]
enum RpcFailure {
    Transport(String),
    Status(StatusCode),
    Decode(String),
    Rpc(RpcErrorObject),
    Empty,
}

impl RpcFailure {
    fn is_retryable(&self) -> bool {
        match self {
            RpcFailure::Transport(_) => true,
            RpcFailure::Status(status) => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            RpcFailure::Rpc(err) => {
                RETRYABLE_RPC_CODES.contains(&err.code)
                    || err.message.to_ascii_lowercase().contains("rate limit")
            }
            RpcFailure::Decode(_) | RpcFailure::Empty => false,
        }
    }

    fn describe(&self) -> String {
        match self {
            RpcFailure::Transport(msg) => format!("transport error: {}", msg),
            RpcFailure::Status(status) => format!("RPC failed: {}", status),
            RpcFailure::Decode(msg) => format!("malformed payload: {}", msg),
            RpcFailure::Rpc(err) => format!("RPC error {}: {}", err.code, err.message),
            RpcFailure::Empty => "no transaction data".to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureInfo {
    signature: String,
    block_time: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedTransactionResult {
    block_time: Option<i64>,
    transaction: EncodedTransaction,
    meta: Option<TransactionMeta>,
}

#[derive(Deserialize)]
struct EncodedTransaction {
    message: EncodedMessage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedMessage {
    account_keys: Vec<String>,
    header: Option<MessageHeader>,
    #[serde(default)]
    instructions: Vec<CompiledInstruction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageHeader {
    num_required_signatures: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompiledInstruction {
    program_id_index: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionMeta {
    #[serde(default)]
    pre_balances: Vec<u64>,
    #[serde(default)]
    post_balances: Vec<u64>,
    loaded_addresses: Option<LoadedAddresses>,
}

#[derive(Deserialize, Default)]
struct LoadedAddresses {
    #[serde(default)]
    writable: Vec<String>,
    #[serde(default)]
    readonly: Vec<String>,
}

impl RpcLedger {
    pub fn new(http_client: Client, rpc_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http_client,
            rpc_url: rpc_url.into(),
            timeout,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> std::result::Result<T, RpcFailure> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let response = self
            .http_client
            .post(&self.rpc_url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcFailure::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RpcFailure::Status(response.status()));
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| RpcFailure::Decode(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(RpcFailure::Rpc(err));
        }
        body.result.ok_or(RpcFailure::Empty)
    }
}

#[async_trait]
impl LedgerApi for RpcLedger {
    #[instrument(skip(self, address), fields(address = %address))]
    async fn signatures_for_address(
        &self,
        address: &Address,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<CandidateRef>> {
        let mut options = json!({ "limit": limit });
        if let Some(cursor) = before {
            options["before"] = json!(cursor);
        }

        let page: Vec<SignatureInfo> = match self
            .call("getSignaturesForAddress", json!([address.as_str(), options]))
            .await
        {
            Ok(page) => page,
            Err(RpcFailure::Empty) => Vec::new(),
            Err(failure) => return Err(ScanError::UpstreamUnavailable(failure.describe())),
        };

        debug!("Got {} signatures", page.len());
        Ok(page
            .into_iter()
            .map(|info| CandidateRef::new(info.signature, info.block_time.and_then(unix_time)))
            .collect())
    }

    #[instrument(skip(self))]
    async fn transaction(&self, id: &str) -> Result<DetailRecord> {
        let params = json!([id, { "encoding": "json", "maxSupportedTransactionVersion": 0 }]);
        let raw: Value = self
            .call("getTransaction", params)
            .await
            .map_err(|failure| ScanError::item(id, failure.describe(), failure.is_retryable()))?;

        decode_transaction(id, raw)
    }
}

/// Decode a `getTransaction` result into a `DetailRecord`.
pub fn decode_transaction(id: &str, raw: Value) -> Result<DetailRecord> {
    let malformed = |reason: String| ScanError::item(id, reason, false);

    let result: EncodedTransactionResult =
        serde_json::from_value(raw).map_err(|e| malformed(format!("malformed payload: {}", e)))?;
    let meta = result
        .meta
        .ok_or_else(|| malformed("no transaction meta".to_string()))?;
    let message = result.transaction.message;

    let loaded = meta.loaded_addresses.unwrap_or_default();
    let account_keys: Vec<Address> = message
        .account_keys
        .into_iter()
        .chain(loaded.writable)
        .chain(loaded.readonly)
        .map(Address::from_upstream)
        .collect();

    let signer_count = message
        .header
        .map(|header| header.num_required_signatures)
        .unwrap_or(1)
        .max(1);
    let signers = NonEmpty::from_vec(account_keys.iter().take(signer_count).cloned().collect())
        .ok_or_else(|| malformed("transaction has no account keys".to_string()))?;

    let referenced_programs: BTreeSet<Address> = message
        .instructions
        .iter()
        .filter_map(|ix| account_keys.get(ix.program_id_index).cloned())
        .collect();

    let balance_deltas: BTreeMap<usize, i64> = meta
        .pre_balances
        .iter()
        .zip(meta.post_balances.iter())
        .enumerate()
        .map(|(index, (pre, post))| (index, (*post as i128 - *pre as i128) as i64))
        .collect();

    Ok(DetailRecord {
        id: id.to_string(),
        signers,
        account_keys,
        referenced_programs,
        balance_deltas,
        block_time: result.block_time.and_then(unix_time),
    })
}

fn unix_time(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_transaction() -> Value {
        json!({
            "slot": 250_000_000u64,
            "blockTime": 1_717_000_000i64,
            "transaction": {
                "signatures": ["sig1"],
                "message": {
                    "header": {
                        "numRequiredSignatures": 1,
                        "numReadonlySignedAccounts": 0,
                        "numReadonlyUnsignedAccounts": 2
                    },
                    "accountKeys": [
                        "Wallet1",
                        "Vault1",
                        "ComputeBudget111111111111111111111111111111"
                    ],
                    "instructions": [
                        { "programIdIndex": 2, "accounts": [], "data": "" },
                        { "programIdIndex": 3, "accounts": [0, 1], "data": "3Bxs" }
                    ]
                }
            },
            "meta": {
                "err": null,
                "fee": 5000,
                "preBalances": [1_000_000u64, 2_000_000u64, 1u64, 1u64],
                "postBalances": [1_495_000u64, 1_500_000u64, 1u64, 1u64],
                "loadedAddresses": {
                    "writable": [],
                    "readonly": ["FeeProgram1"]
                }
            }
        })
    }

    #[test]
    fn test_decode_transaction_resolves_loaded_programs() {
        let record = decode_transaction("sig1", sample_transaction()).unwrap();

        assert_eq!(record.fee_payer().as_str(), "Wallet1");
        assert_eq!(record.account_keys.len(), 4);
        assert!(record.referenced_programs.contains(&Address::from_upstream("FeeProgram1")));
        assert_eq!(record.delta_at(0), 495_000);
        assert_eq!(record.delta_at(1), -500_000);
        assert_eq!(record.delta_at(9), 0);
        assert_eq!(record.block_time.unwrap().timestamp(), 1_717_000_000);
    }

    #[test]
    fn test_decode_transaction_without_meta_is_item_failure() {
        let mut raw = sample_transaction();
        raw["meta"] = Value::Null;

        let err = decode_transaction("sig1", raw).unwrap_err();
        assert!(matches!(err, ScanError::ItemUnavailable { retryable: false, .. }));
    }

    #[test]
    fn test_decode_transaction_without_accounts_is_item_failure() {
        let mut raw = sample_transaction();
        raw["transaction"]["message"]["accountKeys"] = json!([]);
        raw["meta"]["loadedAddresses"] = Value::Null;

        let err = decode_transaction("sig1", raw).unwrap_err();
        assert!(matches!(err, ScanError::ItemUnavailable { .. }));
    }

    #[test]
    fn test_rpc_failure_retryability() {
        assert!(RpcFailure::Status(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(RpcFailure::Status(StatusCode::BAD_GATEWAY).is_retryable());
        assert!(!RpcFailure::Status(StatusCode::BAD_REQUEST).is_retryable());
        assert!(RpcFailure::Rpc(RpcErrorObject {
            code: -32429,
            message: "Too many requests".to_string()
        })
        .is_retryable());
        assert!(!RpcFailure::Rpc(RpcErrorObject {
            code: -32602,
            message: "Invalid param".to_string()
        })
        .is_retryable());
        assert!(!RpcFailure::Empty.is_retryable());
    }

    #[test]
    fn test_signature_info_decoding() {
        let page: Vec<SignatureInfo> = serde_json::from_value(json!([
            {
                "signature": "a",
                "slot": 1,
                "err": null,
                "memo": null,
                "blockTime": 1_700_000_000i64
            },
            { "signature": "b", "slot": 1, "err": null, "memo": null, "blockTime": null }
        ]))
        .unwrap();

        assert_eq!(page.len(), 2);
        assert_eq!(page[0].block_time, Some(1_700_000_000));
        assert!(page[1].block_time.is_none());
    }
}
