//! Command-line front end for claim-sentinel.

use anyhow::{Context, Result};
use claim_sentinel::{
    Address, ClaimDetector, ClaimReport, RiskReport, RiskScorer, ScanConfig, ScanOptions,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, Level};

/// Fee-claim detection and creator-royalty risk checks for Solana tokens
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a wallet's recent transactions for fee claims
    Claims {
        #[arg(value_name = "WALLET")]
        wallet: String,
        #[command(flatten)]
        scan: ScanArgs,
    },
    /// Resolve the fee-share wallet of a social handle, then scan it
    Wallet {
        #[arg(value_name = "TWITTER_USERNAME")]
        twitter_username: String,
        #[command(flatten)]
        scan: ScanArgs,
    },
    /// Score a token's creator-royalty configuration
    Risk {
        #[arg(value_name = "TOKEN")]
        token: String,
        /// Wall-clock budget in seconds
        #[arg(long)]
        max_elapsed_secs: Option<u64>,
    },
    /// Fees collected by a token since launch
    LifetimeFees {
        #[arg(value_name = "TOKEN")]
        token: String,
    },
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Fee program to look for (defaults to FEE_PROGRAM or the Bags fee program)
    #[arg(long)]
    program: Option<String>,
    /// Most transactions to examine
    #[arg(long)]
    max_candidates: Option<usize>,
    /// Wall-clock budget in seconds
    #[arg(long)]
    max_elapsed_secs: Option<u64>,
}

impl ScanArgs {
    fn options(&self, config: &ScanConfig) -> ScanOptions {
        let defaults = ScanOptions::from_config(config);
        ScanOptions::new(
            self.max_candidates.unwrap_or(defaults.max_candidates),
            self.max_elapsed_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_elapsed),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let config = ScanConfig::from_env().context("Failed to load configuration")?;
    if config.uses_public_rpc() {
        info!("No HELIUS_API_KEY or SOLANA_RPC_URL set, using the public RPC endpoint");
    }

    let succeeded = match cli.command {
        Command::Claims { wallet, scan } => run_claims(&config, &wallet, &scan).await?,
        Command::Wallet {
            twitter_username,
            scan,
        } => run_wallet(&config, &twitter_username, &scan).await?,
        Command::Risk {
            token,
            max_elapsed_secs,
        } => {
            let budget = Duration::from_secs(
                max_elapsed_secs.unwrap_or(config.default_max_elapsed_seconds),
            );
            run_risk(&config, &token, budget).await?
        }
        Command::LifetimeFees { token } => run_lifetime_fees(&config, &token).await?,
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to render output")?);
    Ok(())
}

async fn run_claims(config: &ScanConfig, wallet: &str, scan: &ScanArgs) -> Result<bool> {
    let program = scan.program.clone().unwrap_or_else(|| config.fee_program.clone());
    let detector =
        ClaimDetector::with_rpc(config.clone()).context("Failed to build ledger client")?;

    match detector.detect_claims(wallet, &program, scan.options(config)).await {
        Ok(report) => {
            print_json(&report)?;
            Ok(true)
        }
        Err(err) => {
            error!("Claim check failed: {}", err);
            print_json(&ClaimReport::failed(wallet, &program, &err))?;
            Ok(false)
        }
    }
}

async fn run_wallet(config: &ScanConfig, twitter_username: &str, scan: &ScanArgs) -> Result<bool> {
    let scorer = RiskScorer::with_http(config.clone()).context("Failed to build registry client")?;

    match scorer.registry().fee_share_wallet(twitter_username).await {
        Ok(wallet) => {
            info!("Fee-share wallet for @{}: {}", twitter_username.trim_start_matches('@'), wallet);
            run_claims(config, wallet.as_str(), scan).await
        }
        Err(err) => {
            error!("Wallet lookup failed: {}", err);
            print_json(&json!({
                "twitter_username": twitter_username,
                "error": format!("Wallet lookup failed: {}", err),
            }))?;
            Ok(false)
        }
    }
}

async fn run_risk(config: &ScanConfig, token: &str, budget: Duration) -> Result<bool> {
    let scorer = RiskScorer::with_http(config.clone()).context("Failed to build registry client")?;

    match scorer.assess_risk(token, budget).await {
        Ok(report) => {
            print_json(&report)?;
            Ok(true)
        }
        Err(err) => {
            error!("Risk check failed: {}", err);
            print_json(&RiskReport::failed(token, &err))?;
            Ok(false)
        }
    }
}

async fn run_lifetime_fees(config: &ScanConfig, token: &str) -> Result<bool> {
    let scorer = RiskScorer::with_http(config.clone()).context("Failed to build registry client")?;

    let outcome = match Address::parse(token) {
        Ok(address) => scorer.registry().lifetime_fees(&address).await,
        Err(err) => Err(err),
    };

    match outcome {
        Ok(fees) => {
            print_json(&json!({ "token": token, "lifetime_fees_sol": fees.to_string() }))?;
            Ok(true)
        }
        Err(err) => {
            error!("Lifetime fee lookup failed: {}", err);
            print_json(&json!({
                "token": token,
                "error": format!("Lifetime fee lookup failed: {}", err),
            }))?;
            Ok(false)
        }
    }
}
