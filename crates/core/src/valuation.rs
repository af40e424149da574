//! Collateral valuation in USD.

use alloy::primitives::U256;

use crate::error::{EngineError, EngineResult};
use crate::ledger::UserPosition;
use crate::oracle::PriceOracle;
use crate::registry::{CollateralAsset, SystemRegistry};
use crate::u256_math;

/// Converts collateral balances to WAD-denominated USD.
#[derive(Debug, Clone, Copy)]
pub struct ValuationEngine<'a> {
    registry: &'a SystemRegistry,
    oracle: &'a PriceOracle,
}

impl<'a> ValuationEngine<'a> {
    pub fn new(registry: &'a SystemRegistry, oracle: &'a PriceOracle) -> Self {
        Self { registry, oracle }
    }

    /// Sum of `balance * price` over every registered token, in registry order.
    ///
    /// Tokens the user holds none of are skipped without touching their feed.
    pub fn total_collateral_value_usd(&self, position: &UserPosition) -> EngineResult<U256> {
        let mut total = U256::ZERO;
        for asset in self.registry.iter() {
            let amount = position.collateral_of(&asset.token);
            if amount.is_zero() {
                continue;
            }
            let value = self.usd_value(asset, amount)?;
            total = total.checked_add(value).ok_or(EngineError::MathOverflow)?;
        }
        Ok(total)
    }

    /// USD value of `amount` of one collateral token at the current price.
    pub fn usd_value(&self, asset: &CollateralAsset, amount: U256) -> EngineResult<U256> {
        let quote = self.oracle.price(asset)?;
        u256_math::calculate_usd_wad(amount, quote.price, asset.decimals).ok_or(EngineError::MathOverflow)
    }

    /// Amount of a collateral token worth `usd_wad` at the current price. Rounds down.
    pub fn token_amount_from_usd(&self, asset: &CollateralAsset, usd_wad: U256) -> EngineResult<U256> {
        let quote = self.oracle.price(asset)?;
        u256_math::token_amount_from_usd(usd_wad, quote.price, asset.decimals)
            .ok_or(EngineError::MathOverflow)
    }
}
