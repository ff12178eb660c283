//! Natural-language heuristic scoring service and its prompt.

use crate::error::{Result, ScanError};
use crate::types::{Address, CreatorRecord};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, instrument};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Opaque scoring service. Returns the raw reply text; decoding is the
/// caller's concern.
#[async_trait]
pub trait HeuristicScorer: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

pub struct AnthropicScorer {
    http_client: Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl AnthropicScorer {
    pub fn new(
        http_client: Client,
        api_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            api_url: api_url.into(),
            api_key,
            model: model.into(),
            max_tokens,
            timeout,
        }
    }
}

#[async_trait]
impl HeuristicScorer for AnthropicScorer {
    #[instrument(skip(self, prompt))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ScanError::Validation("ANTHROPIC_API_KEY not configured".to_string()))?;

        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .http_client
            .post(&self.api_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::UpstreamUnavailable(format!(
                "Anthropic API failed: {}",
                status
            )));
        }

        let reply: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ScanError::ParseFailure(format!("Anthropic payload: {}", e)))?;

        let text = reply
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        debug!("Heuristic reply received ({} chars)", text.len());
        Ok(text)
    }
}

/// Prompt describing a token's creators and royalties, asking for a JSON
/// verdict of the form `{riskScore, analysis, redFlags, recommendation}`.
pub fn build_prompt(token: &Address, creators: &[CreatorRecord]) -> String {
    let mut prompt = String::from(
        "You analyze cryptocurrency tokens for signs of a \"LARP\": a token that pretends to be \
         backed by a celebrity, influencer or established project without their involvement.\n\n\
         Assess the risk of the following token.\n\n",
    );

    let _ = writeln!(prompt, "Token Contract: {}", token);
    let _ = writeln!(prompt, "Number of Creators: {}", creators.len());
    prompt.push_str("\nCreator Details:\n");

    for creator in creators {
        let _ = write!(
            prompt,
            "\n- Username: {}\n- Twitter: @{}\n- Royalty: {}%\n\
             - Is Verified Creator: {}\n- Launch History: {} tokens\n- Wallet: {}\n",
            creator.username.as_deref().unwrap_or("N/A"),
            creator.twitter_username.as_deref().unwrap_or("N/A"),
            creator.royalty_percent(),
            creator.is_verified_creator,
            creator.historical_launch_count,
            creator.wallet,
        );
    }

    prompt.push_str(
        "\nRED FLAGS TO CHECK:\n\
         1. Unverified creators (isCreator: false) receiving more than 10% royalties\n\
         2. Verified creators receiving less than 5%, suggesting the real person is not involved\n\
         3. Creators who have launched more than 5 tokens\n\
         4. Generic usernames that do not match the person or project the token represents\n\
         5. No verified creator at all\n\
         6. Most royalties flowing to unverified wallets\n\n\
         Reply with JSON only, in this format:\n\
         {\n  \"riskScore\": number from 0 to 100 (100 is highest risk),\n  \
         \"analysis\": \"short explanation focused on royalty distribution and verification\",\n  \
         \"redFlags\": [\"specific\", \"red\", \"flags\"],\n  \
         \"recommendation\": \"AVOID/CAUTION/MODERATE/LOW_RISK\"\n}\n",
    );

    prompt
}
