//! Construction-time deployment configuration.
//!
//! Lists the accepted collateral tokens and their price feeds as two
//! parallel, ordered lists, plus the debt token and the engine's own account.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{EngineError, EngineResult};

/// Deployment file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Deployment details
    pub deployment: DeploymentDetails,
}

/// Deployment details (TOML-loadable, addresses as hex strings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentDetails {
    /// Deployment name (e.g., "local")
    #[serde(default = "default_name")]
    pub name: String,
    /// Engine account address
    pub engine: String,
    /// Debt token address
    pub dsc: String,
    /// Collateral token addresses, in registry order
    pub token_addresses: Vec<String>,
    /// Price feed addresses, one per collateral token
    pub price_feed_addresses: Vec<String>,
}

fn default_name() -> String {
    "local".to_string()
}

/// Parsed deployment parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentParams {
    pub name: String,
    pub engine: Address,
    pub dsc: Address,
    pub token_addresses: Vec<Address>,
    pub price_feed_addresses: Vec<Address>,
}

impl DeploymentConfig {
    /// Parse from TOML content.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse deployment config: {}", e))
    }

    /// Load from file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parse every address, expanding `${VAR}` references first.
    ///
    /// List lengths are checked later, when the registry is built.
    pub fn resolve(&self) -> EngineResult<DeploymentParams> {
        let details = &self.deployment;

        let parse_list = |values: &[String], what: &str| -> EngineResult<Vec<Address>> {
            values.iter().map(|v| parse_address(v, what)).collect()
        };

        Ok(DeploymentParams {
            name: details.name.clone(),
            engine: parse_address(&details.engine, "engine")?,
            dsc: parse_address(&details.dsc, "dsc")?,
            token_addresses: parse_list(&details.token_addresses, "collateral token")?,
            price_feed_addresses: parse_list(&details.price_feed_addresses, "price feed")?,
        })
    }
}

/// Parse an address after environment expansion.
pub fn parse_address(value: &str, what: &str) -> EngineResult<Address> {
    let expanded = expand_env(value);
    expanded.trim().parse().map_err(|e| {
        EngineError::InvalidConfiguration(format!("invalid {} address '{}': {}", what, expanded, e))
    })
}

/// Expand ${VAR_NAME} patterns with environment variable values.
fn expand_env(s: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return s.to_string();
    };

    let mut result = s.to_string();
    for cap in re.captures_iter(s) {
        if let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) {
            if let Ok(value) = std::env::var(var_match.as_str()) {
                result = result.replace(full_match.as_str(), &value);
            }
        }
    }

    result
}
