//! Scenario file format.
//!
//! A scenario describes a deployment, the in-memory tokens and price feeds
//! behind it, funded accounts and an ordered list of steps to run through the
//! engine.

use std::collections::BTreeMap;
use std::path::Path;

use alloy::primitives::{utils::parse_units, U256};
use anyhow::{bail, Context, Result};
use serde::Deserialize;

use dsc_core::config::DeploymentDetails;

/// Scenario file root.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Engine, debt token and collateral lists
    pub deployment: DeploymentDetails,

    /// Account that deploys the tokens and hands the debt token to the engine
    #[serde(default = "default_deployer")]
    pub deployer: String,

    /// Collateral token metadata
    pub tokens: Vec<TokenSpec>,

    /// Price feeds with their initial answers
    pub feeds: Vec<FeedSpec>,

    #[serde(default)]
    pub accounts: Vec<AccountSpec>,

    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_deployer() -> String {
    "0x00000000000000000000000000000000000000d0".to_string()
}

/// A collateral token to create.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSpec {
    pub symbol: String,
    pub address: String,
    #[serde(default = "default_token_decimals")]
    pub decimals: u8,
}

fn default_token_decimals() -> u8 {
    18
}

/// A Chainlink-style aggregator to create.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSpec {
    pub address: String,
    #[serde(default = "default_feed_decimals")]
    pub decimals: u8,
    /// Initial answer in feed decimals
    pub answer: i64,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_feed_decimals() -> u8 {
    8
}

/// A named account, funded from the deployer.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountSpec {
    pub name: String,
    pub address: String,
    /// Token symbol -> whole-unit amount (e.g. "100" or "0.5")
    #[serde(default)]
    pub funds: BTreeMap<String, String>,
    /// Approve the engine for every token, including the debt token
    #[serde(default = "default_true")]
    pub approve_engine: bool,
}

fn default_true() -> bool {
    true
}

/// One engine call. Accounts are referenced by name and tokens by symbol;
/// amounts are decimal strings in whole units.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Deposit {
        account: String,
        token: String,
        amount: String,
    },
    Mint {
        account: String,
        amount: String,
    },
    Redeem {
        account: String,
        token: String,
        amount: String,
    },
    Burn {
        account: String,
        amount: String,
    },
    DepositAndMint {
        account: String,
        token: String,
        collateral: String,
        mint: String,
    },
    RedeemForDsc {
        account: String,
        token: String,
        collateral: String,
        burn: String,
    },
    /// `debt_to_cover = "restore"` sizes the liquidation to bring the user
    /// back to the minimum health factor.
    Liquidate {
        liquidator: String,
        user: String,
        token: String,
        debt_to_cover: String,
    },
    SetPrice {
        token: String,
        answer: i64,
    },
}

impl Step {
    /// Action name as written in the scenario.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Deposit { .. } => "deposit",
            Self::Mint { .. } => "mint",
            Self::Redeem { .. } => "redeem",
            Self::Burn { .. } => "burn",
            Self::DepositAndMint { .. } => "deposit_and_mint",
            Self::RedeemForDsc { .. } => "redeem_for_dsc",
            Self::Liquidate { .. } => "liquidate",
            Self::SetPrice { .. } => "set_price",
        }
    }
}

impl Scenario {
    /// Parse from TOML content.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse scenario")
    }

    /// Load from file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_toml(&content)
    }
}

/// Parse a non-negative decimal amount into base units.
pub fn parse_amount(value: &str, decimals: u8) -> Result<U256> {
    let value = value.trim();
    if value.starts_with('-') {
        bail!("Amount '{}' must not be negative", value);
    }
    let parsed = parse_units(value, decimals)
        .with_context(|| format!("Invalid amount '{}' for {} decimals", value, decimals))?;
    Ok(parsed.get_absolute())
}
