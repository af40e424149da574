//! Liquidation planning.
//!
//! A liquidator repays `debt_to_cover` of an under-collateralized user's debt
//! and receives the equivalent amount of one collateral token plus the
//! liquidation bonus. Planning is pure: it reads the user's position and
//! prices, and the engine applies the result to a staged copy.

use alloy::primitives::U256;
use tracing::debug;

use crate::config::RiskParameters;
use crate::error::{EngineError, EngineResult};
use crate::health::HealthFactorEngine;
use crate::ledger::UserPosition;
use crate::registry::CollateralAsset;
use crate::u256_math::{self, BPS_DENOMINATOR, WAD};
use crate::valuation::ValuationEngine;

/// Extra debt added to the restore estimate to absorb rounding in the
/// health-factor math.
const RESTORE_ROUNDING_MARGIN: u64 = 10;

/// What a liquidation will do to the user's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationPlan {
    pub asset: CollateralAsset,
    /// Debt repaid by the liquidator (18 decimals)
    pub debt_to_cover: U256,
    /// Collateral worth exactly `debt_to_cover`
    pub token_amount_from_debt_covered: U256,
    /// Bonus collateral on top
    pub bonus_collateral: U256,
    /// Total collateral moved to the liquidator
    pub collateral_to_seize: U256,
    /// User's health factor before liquidation
    pub starting_health_factor: U256,
}

/// Seizure and improvement checks for liquidations.
#[derive(Debug, Clone, Copy)]
pub struct LiquidationEngine<'a> {
    valuation: ValuationEngine<'a>,
    health: HealthFactorEngine<'a>,
    params: &'a RiskParameters,
}

impl<'a> LiquidationEngine<'a> {
    pub fn new(valuation: ValuationEngine<'a>, params: &'a RiskParameters) -> Self {
        Self {
            valuation,
            health: HealthFactorEngine::new(valuation, params),
            params,
        }
    }

    /// Plan seizing `asset` from `position` in exchange for `debt_to_cover`.
    ///
    /// Fails `HealthFactorOk` for a healthy position, `BurnExceedsDebt` when
    /// covering more than the user owes and `InsufficientCollateral` when the
    /// bonus-inclusive seizure exceeds the user's balance of `asset`.
    pub fn plan(
        &self,
        position: &UserPosition,
        asset: &CollateralAsset,
        debt_to_cover: U256,
    ) -> EngineResult<LiquidationPlan> {
        let starting_health_factor = self.health.health_factor(position)?;
        if !self.health.is_liquidatable(starting_health_factor) {
            return Err(EngineError::HealthFactorOk {
                health_factor: starting_health_factor,
            });
        }

        if debt_to_cover > position.debt() {
            return Err(EngineError::BurnExceedsDebt {
                debt: position.debt(),
                requested: debt_to_cover,
            });
        }

        let (token_amount_from_debt_covered, bonus_collateral, collateral_to_seize) =
            self.seizure(asset, debt_to_cover)?;

        let available = position.collateral_of(&asset.token);
        if collateral_to_seize > available {
            return Err(EngineError::InsufficientCollateral {
                token: asset.token,
                available,
                requested: collateral_to_seize,
            });
        }

        debug!(
            token = %asset.token,
            %debt_to_cover,
            %collateral_to_seize,
            starting_health_factor = u256_math::wad_to_f64(starting_health_factor),
            "Liquidation planned"
        );

        Ok(LiquidationPlan {
            asset: *asset,
            debt_to_cover,
            token_amount_from_debt_covered,
            bonus_collateral,
            collateral_to_seize,
            starting_health_factor,
        })
    }

    /// Collateral owed for `debt_to_cover`: (base, bonus, total).
    fn seizure(&self, asset: &CollateralAsset, debt_to_cover: U256) -> EngineResult<(U256, U256, U256)> {
        let base = self.valuation.token_amount_from_usd(asset, debt_to_cover)?;
        let bonus = u256_math::bps_of(base, self.params.liquidation_bonus_bps).ok_or(EngineError::MathOverflow)?;
        let total = base.checked_add(bonus).ok_or(EngineError::MathOverflow)?;
        Ok((base, bonus, total))
    }

    /// Apply a plan to a staged copy of the user's position.
    pub fn apply(&self, plan: &LiquidationPlan, position: &mut UserPosition) -> EngineResult<()> {
        position.record_burn(plan.debt_to_cover)?;
        position.record_withdrawal(plan.asset.token, plan.collateral_to_seize)
    }

    /// Ending health factor, which must be strictly above the starting one.
    pub fn verify_improved(&self, plan: &LiquidationPlan, position: &UserPosition) -> EngineResult<U256> {
        let ending = self.health.health_factor(position)?;
        if ending <= plan.starting_health_factor {
            return Err(EngineError::HealthFactorNotImproved {
                before: plan.starting_health_factor,
                after: ending,
            });
        }
        Ok(ending)
    }

    /// Smallest `debt_to_cover`, seized from `asset`, that brings `position`
    /// back to the minimum health factor.
    ///
    /// `Some(0)` when the position is already healthy. `None` when no amount
    /// works: either each repaid unit costs more adjusted collateral than it
    /// frees (`threshold * (1 + bonus) >= minimum`), or the user does not hold
    /// enough of `asset` to cover the seizure.
    pub fn debt_to_restore_health(
        &self,
        position: &UserPosition,
        asset: &CollateralAsset,
    ) -> EngineResult<Option<U256>> {
        let debt = position.debt();
        if debt.is_zero() {
            return Ok(Some(U256::ZERO));
        }
        let collateral_value = self.valuation.total_collateral_value_usd(position)?;

        // After covering d: t * (C - d(1+b)) >= m * (D - d)
        // => d * (m - t(1+b)) >= m*D - t*C, scaled by BPS^2 and WAD.
        let bps = BPS_DENOMINATOR;
        let bps_sq = bps * bps;
        let threshold = U256::from(self.params.liquidation_threshold_bps);
        let bonus_factor = bps + U256::from(self.params.liquidation_bonus_bps);
        let minimum = self.params.min_health_factor();

        let overflow = || EngineError::MathOverflow;
        let lhs_rate = minimum.checked_mul(bps_sq).ok_or_else(overflow)?;
        let rhs_rate = threshold
            .checked_mul(bonus_factor)
            .and_then(|v| v.checked_mul(WAD))
            .ok_or_else(overflow)?;
        if lhs_rate <= rhs_rate {
            return Ok(None);
        }
        let denominator = lhs_rate - rhs_rate;

        let owed = minimum
            .checked_mul(debt)
            .and_then(|v| v.checked_mul(bps_sq))
            .ok_or_else(overflow)?;
        let backed = threshold
            .checked_mul(collateral_value)
            .and_then(|v| v.checked_mul(bps))
            .and_then(|v| v.checked_mul(WAD))
            .ok_or_else(overflow)?;
        if owed <= backed {
            return Ok(Some(U256::ZERO));
        }
        let numerator = owed - backed;

        let mut exact = numerator / denominator;
        if !(numerator % denominator).is_zero() {
            exact += U256::from(1u64);
        }
        let needed = exact.saturating_add(U256::from(RESTORE_ROUNDING_MARGIN)).min(debt);

        let (_, _, seized) = self.seizure(asset, needed)?;
        if seized > position.collateral_of(&asset.token) {
            return Ok(None);
        }

        Ok(Some(needed))
    }
}
