//! Collateral allow-list.
//!
//! Fixed at construction. Iteration order is the order the deployment listed
//! the tokens in, which keeps valuation deterministic.

use alloy::primitives::Address;
use smallvec::SmallVec;
use std::collections::HashSet;

use crate::error::{EngineError, EngineResult};

/// Largest token precision the valuation math supports.
const MAX_TOKEN_DECIMALS: u8 = 36;

/// An accepted collateral token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollateralAsset {
    /// Token contract address
    pub token: Address,
    /// USD price feed for the token
    pub price_feed: Address,
    /// Token decimals
    pub decimals: u8,
}

/// Immutable registry of accepted collateral.
#[derive(Debug, Clone)]
pub struct SystemRegistry {
    assets: SmallVec<[CollateralAsset; 4]>,
}

impl SystemRegistry {
    /// Build the registry from parallel lists.
    ///
    /// `decimals` must line up with `token_addresses`.
    pub fn new(
        token_addresses: &[Address],
        price_feed_addresses: &[Address],
        decimals: &[u8],
    ) -> EngineResult<Self> {
        if token_addresses.len() != price_feed_addresses.len() {
            return Err(EngineError::ConfigurationMismatch {
                tokens: token_addresses.len(),
                price_feeds: price_feed_addresses.len(),
            });
        }
        if decimals.len() != token_addresses.len() {
            return Err(EngineError::InvalidConfiguration(format!(
                "{} decimals for {} collateral tokens",
                decimals.len(),
                token_addresses.len()
            )));
        }
        if token_addresses.is_empty() {
            return Err(EngineError::InvalidConfiguration(
                "at least one collateral token is required".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(token_addresses.len());
        let mut assets = SmallVec::new();

        for ((&token, &price_feed), &decimals) in token_addresses
            .iter()
            .zip(price_feed_addresses)
            .zip(decimals)
        {
            if token == Address::ZERO || price_feed == Address::ZERO {
                return Err(EngineError::InvalidConfiguration(
                    "zero address in collateral configuration".to_string(),
                ));
            }
            if !seen.insert(token) {
                return Err(EngineError::InvalidConfiguration(format!(
                    "collateral token {} listed twice",
                    token
                )));
            }
            if decimals > MAX_TOKEN_DECIMALS {
                return Err(EngineError::InvalidConfiguration(format!(
                    "collateral token {} has {} decimals (max {})",
                    token, decimals, MAX_TOKEN_DECIMALS
                )));
            }

            assets.push(CollateralAsset {
                token,
                price_feed,
                decimals,
            });
        }

        Ok(Self { assets })
    }

    /// Look up an accepted token.
    pub fn get(&self, token: &Address) -> Option<&CollateralAsset> {
        self.assets.iter().find(|a| &a.token == token)
    }

    /// Look up an accepted token or fail `NotAllowedCollateral`.
    pub fn require(&self, token: &Address) -> EngineResult<&CollateralAsset> {
        self.get(token)
            .ok_or(EngineError::NotAllowedCollateral { token: *token })
    }

    /// Assets in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &CollateralAsset> {
        self.assets.iter()
    }

    /// Token addresses in registry order.
    pub fn tokens(&self) -> Vec<Address> {
        self.assets.iter().map(|a| a.token).collect()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
