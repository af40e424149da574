//! Health factor computation and the solvency gate.
//!
//! HF = collateral_value_usd * liquidation_threshold / debt, in WAD.
//! A position without debt reports `U256::MAX` and is never valued, so an
//! unavailable feed cannot block a debt-free user.

use alloy::primitives::U256;
use tracing::debug;

use crate::config::RiskParameters;
use crate::error::{EngineError, EngineResult};
use crate::ledger::UserPosition;
use crate::u256_math;
use crate::valuation::ValuationEngine;

/// Health factor of a position with no debt.
pub const MAX_HEALTH_FACTOR: U256 = U256::MAX;

/// Computes health factors against the configured risk constants.
#[derive(Debug, Clone, Copy)]
pub struct HealthFactorEngine<'a> {
    valuation: ValuationEngine<'a>,
    params: &'a RiskParameters,
}

impl<'a> HealthFactorEngine<'a> {
    pub fn new(valuation: ValuationEngine<'a>, params: &'a RiskParameters) -> Self {
        Self { valuation, params }
    }

    /// Pure formula: debt and collateral value both WAD.
    pub fn calculate(&self, debt: U256, collateral_value_usd: U256) -> EngineResult<U256> {
        calculate_health_factor(debt, collateral_value_usd, self.params)
    }

    /// Health factor of a (possibly staged) position.
    pub fn health_factor(&self, position: &UserPosition) -> EngineResult<U256> {
        if position.debt().is_zero() {
            return Ok(MAX_HEALTH_FACTOR);
        }
        let collateral_value = self.valuation.total_collateral_value_usd(position)?;
        self.calculate(position.debt(), collateral_value)
    }

    /// Fail `HealthFactorTooLow` when the position is below the minimum.
    ///
    /// Returns the computed health factor on success.
    pub fn revert_if_health_factor_broken(&self, position: &UserPosition) -> EngineResult<U256> {
        let health_factor = self.health_factor(position)?;
        if health_factor < self.params.min_health_factor() {
            debug!(
                health_factor = u256_math::wad_to_f64(health_factor),
                "Health factor below minimum"
            );
            return Err(EngineError::HealthFactorTooLow { health_factor });
        }
        Ok(health_factor)
    }

    /// Whether a health factor allows liquidation.
    pub fn is_liquidatable(&self, health_factor: U256) -> bool {
        health_factor < self.params.min_health_factor()
    }
}

/// Health factor from raw totals.
pub fn calculate_health_factor(
    debt: U256,
    collateral_value_usd: U256,
    params: &RiskParameters,
) -> EngineResult<U256> {
    u256_math::calculate_hf_wad(collateral_value_usd, debt, params.liquidation_threshold_bps)
        .ok_or(EngineError::MathOverflow)
}
