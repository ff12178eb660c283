//! Creator/royalty registry client for the Bags launchpad API.

use crate::error::{Result, ScanError};
use crate::types::{Address, CreatorRecord};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Token-launch registry collaborator.
#[async_trait]
pub trait CreatorRegistry: Send + Sync {
    /// Royalty table of a token. Launch counts are left at zero.
    async fn creators(&self, token: &Address) -> Result<Vec<CreatorRecord>>;

    /// Number of tokens a wallet has launched or co-created.
    async fn launch_count(&self, wallet: &Address) -> Result<u32>;

    /// Fee-share wallet bound to a social handle.
    async fn fee_share_wallet(&self, twitter_username: &str) -> Result<Address>;

    /// Fees collected by a token since launch, in SOL.
    async fn lifetime_fees(&self, token: &Address) -> Result<Decimal>;
}

/// Response envelope shared by every registry endpoint.
#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    response: Option<T>,
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatorEntry {
    wallet: String,
    #[serde(default)]
    is_creator: bool,
    #[serde(default)]
    royalty_bps: u32,
    username: Option<String>,
    twitter_username: Option<String>,
}

impl From<CreatorEntry> for CreatorRecord {
    fn from(entry: CreatorEntry) -> Self {
        CreatorRecord {
            wallet: Address::from_upstream(entry.wallet),
            is_verified_creator: entry.is_creator,
            royalty_share_bps: entry.royalty_bps,
            historical_launch_count: 0,
            username: entry.username,
            twitter_username: entry.twitter_username,
        }
    }
}

pub struct BagsRegistry {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl BagsRegistry {
    pub fn new(
        http_client: Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
        }
    }

    /// GET an endpoint and unwrap its envelope. A `success: false` reply or
    /// a missing body is reported as `NotFound`.
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ScanError::Validation("BAGS_API_KEY not configured".to_string()))?;

        let response = self
            .http_client
            .get(format!("{}/{}", self.base_url, path))
            .query(query)
            .header("x-api-key", api_key)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::UpstreamUnavailable(format!("Bags API failed: {}", status)));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ScanError::ParseFailure(format!("Bags API payload: {}", e)))?;

        match envelope {
            Envelope {
                success: true,
                response: Some(body),
                ..
            } => Ok(body),
            Envelope { error, .. } => Err(ScanError::NotFound(
                error.unwrap_or_else(|| format!("{} returned no data", path)),
            )),
        }
    }
}

#[async_trait]
impl CreatorRegistry for BagsRegistry {
    #[instrument(skip(self, token), fields(token = %token))]
    async fn creators(&self, token: &Address) -> Result<Vec<CreatorRecord>> {
        let entries: Vec<CreatorEntry> = self
            .get("token-launch/creator/v2", &[("tokenMint", token.as_str())])
            .await
            .map_err(|err| match err {
                ScanError::NotFound(_) => {
                    ScanError::NotFound("Token not found in Bags system".to_string())
                }
                other => other,
            })?;

        debug!("Found {} creators for token", entries.len());
        Ok(entries.into_iter().map(CreatorRecord::from).collect())
    }

    #[instrument(skip(self, wallet), fields(wallet = %wallet))]
    async fn launch_count(&self, wallet: &Address) -> Result<u32> {
        let history = self
            .get::<Vec<Value>>("token-launch/creator/history", &[("wallet", wallet.as_str())])
            .await;
        launches_in(history)
    }

    #[instrument(skip(self))]
    async fn fee_share_wallet(&self, twitter_username: &str) -> Result<Address> {
        let handle = twitter_username.trim().trim_start_matches('@');
        if handle.is_empty() {
            return Err(ScanError::Validation("twitterUsername parameter is required".to_string()));
        }

        let body: Value = self
            .get("token-launch/fee-share/wallet/twitter", &[("twitterUsername", handle)])
            .await?;
        wallet_from_response(&body)
    }

    #[instrument(skip(self, token), fields(token = %token))]
    async fn lifetime_fees(&self, token: &Address) -> Result<Decimal> {
        let body: Value = self
            .get("token-launch/lifetime-fees", &[("tokenMint", token.as_str())])
            .await?;
        lamports_to_sol(&body)
    }
}

/// A wallet the registry has no history for has launched nothing.
fn launches_in(history: Result<Vec<Value>>) -> Result<u32> {
    match history {
        Ok(launches) => Ok(launches.len() as u32),
        Err(ScanError::NotFound(reason)) => {
            debug!("No launch history: {}", reason);
            Ok(0)
        }
        Err(err) => Err(err),
    }
}

/// The wallet endpoint answers with either a bare address or an object
/// carrying one.
fn wallet_from_response(body: &Value) -> Result<Address> {
    let raw = match body {
        Value::String(wallet) => Some(wallet.as_str()),
        Value::Object(map) => map.get("wallet").and_then(Value::as_str),
        _ => None,
    };
    raw.filter(|wallet| !wallet.is_empty())
        .map(Address::from_upstream)
        .ok_or_else(|| ScanError::ParseFailure("no wallet in fee-share response".to_string()))
}

/// Lifetime fees arrive as lamports, as a string or a number.
fn lamports_to_sol(body: &Value) -> Result<Decimal> {
    let lamports = match body {
        Value::String(raw) => raw.trim().parse::<i64>().ok(),
        Value::Number(number) => number.as_i64(),
        _ => None,
    }
    .ok_or_else(|| ScanError::ParseFailure(format!("unexpected lifetime fees value: {}", body)))?;

    Ok(Decimal::new(lamports, 9).normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_creator_entry_conversion() {
        let entries: Envelope<Vec<CreatorEntry>> = serde_json::from_value(json!({
            "success": true,
            "response": [
                {
                    "wallet": "W1",
                    "isCreator": true,
                    "royaltyBps": 500,
                    "username": "alice",
                    "twitterUsername": "alice_x"
                },
                { "wallet": "W2", "royaltyBps": 9500 }
            ]
        }))
        .unwrap();

        let creators: Vec<CreatorRecord> = entries
            .response
            .unwrap()
            .into_iter()
            .map(CreatorRecord::from)
            .collect();

        assert_eq!(creators.len(), 2);
        assert!(creators[0].is_verified_creator);
        assert_eq!(creators[0].twitter_username.as_deref(), Some("alice_x"));
        assert!(!creators[1].is_verified_creator);
        assert_eq!(creators[1].royalty_share_bps, 9500);
        assert_eq!(creators[1].historical_launch_count, 0);
    }

    #[test]
    fn test_failed_envelope_has_no_body() {
        let envelope: Envelope<Vec<CreatorEntry>> =
            serde_json::from_value(json!({ "success": false, "error": "Token not found" }))
                .unwrap();

        assert!(!envelope.success);
        assert!(envelope.response.is_none());
        assert_eq!(envelope.error.as_deref(), Some("Token not found"));
    }

    #[test]
    fn test_wallet_from_response_shapes() {
        assert_eq!(wallet_from_response(&json!("Wallet1")).unwrap().as_str(), "Wallet1");
        assert_eq!(
            wallet_from_response(&json!({ "wallet": "Wallet2", "platform": "twitter" }))
                .unwrap()
                .as_str(),
            "Wallet2"
        );
        assert!(wallet_from_response(&json!(42)).is_err());
        assert!(wallet_from_response(&json!("")).is_err());
    }

    #[test]
    fn test_unknown_wallet_has_no_launches() {
        assert_eq!(launches_in(Ok(vec![json!({}), json!({})])).unwrap(), 2);
        assert_eq!(
            launches_in(Err(ScanError::NotFound("Wallet not found".to_string()))).unwrap(),
            0
        );
        assert!(matches!(
            launches_in(Err(ScanError::UpstreamUnavailable("Bags API failed: 502".to_string()))),
            Err(ScanError::UpstreamUnavailable(_))
        ));
    }

    #[test]
    fn test_lamports_to_sol() {
        assert_eq!(lamports_to_sol(&json!("1500000000")).unwrap(), dec!(1.5));
        assert_eq!(lamports_to_sol(&json!(250_000)).unwrap(), dec!(0.00025));
        assert!(lamports_to_sol(&json!({})).is_err());
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_network() {
        let registry =
            BagsRegistry::new(Client::new(), "http://127.0.0.1:9", None, Duration::from_secs(1));

        let err = registry.creators(&Address::parse("Token1").unwrap()).await.unwrap_err();
        assert!(matches!(err, ScanError::Validation(_)));
    }
}
