//! Debt ledger operations.

use alloy::primitives::U256;

use super::UserPosition;
use crate::error::{EngineError, EngineResult};

impl UserPosition {
    /// Increase minted debt. The engine re-checks solvency before committing.
    pub fn record_mint(&mut self, amount: U256) -> EngineResult<()> {
        if amount.is_zero() {
            return Err(EngineError::MustBeMoreThanZero);
        }
        self.debt_minted = self
            .debt_minted
            .checked_add(amount)
            .ok_or(EngineError::MathOverflow)?;
        Ok(())
    }

    /// Decrease minted debt; cannot go below zero.
    pub fn record_burn(&mut self, amount: U256) -> EngineResult<()> {
        if amount.is_zero() {
            return Err(EngineError::MustBeMoreThanZero);
        }
        if amount > self.debt_minted {
            return Err(EngineError::BurnExceedsDebt {
                debt: self.debt_minted,
                requested: amount,
            });
        }
        self.debt_minted -= amount;
        Ok(())
    }
}
