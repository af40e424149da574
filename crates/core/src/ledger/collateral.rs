//! Collateral ledger operations.

use alloy::primitives::{Address, U256};

use super::UserPosition;
use crate::error::{EngineError, EngineResult};
use crate::registry::SystemRegistry;

impl UserPosition {
    /// Add deposited collateral.
    ///
    /// Fails `MustBeMoreThanZero` for a zero amount and
    /// `NotAllowedCollateral` for a token outside the registry.
    pub fn record_deposit(
        &mut self,
        registry: &SystemRegistry,
        token: Address,
        amount: U256,
    ) -> EngineResult<()> {
        if amount.is_zero() {
            return Err(EngineError::MustBeMoreThanZero);
        }
        registry.require(&token)?;

        let balance = self.collateral.entry(token).or_insert(U256::ZERO);
        *balance = balance.checked_add(amount).ok_or(EngineError::MathOverflow)?;
        Ok(())
    }

    /// Remove collateral. Solvency is the caller's concern.
    pub fn record_withdrawal(&mut self, token: Address, amount: U256) -> EngineResult<()> {
        if amount.is_zero() {
            return Err(EngineError::MustBeMoreThanZero);
        }

        let available = self.collateral_of(&token);
        if available < amount {
            return Err(EngineError::InsufficientCollateral {
                token,
                available,
                requested: amount,
            });
        }

        self.collateral.insert(token, available - amount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WETH: Address = Address::repeat_byte(0x11);
    const WBTC: Address = Address::repeat_byte(0x12);

    fn registry() -> SystemRegistry {
        SystemRegistry::new(&[WETH], &[Address::repeat_byte(0x21)], &[18]).unwrap()
    }

    #[test]
    fn test_deposit_accumulates() {
        let registry = registry();
        let mut position = UserPosition::default();

        position.record_deposit(&registry, WETH, U256::from(10u64)).unwrap();
        position.record_deposit(&registry, WETH, U256::from(5u64)).unwrap();
        assert_eq!(position.collateral_of(&WETH), U256::from(15u64));
    }

    #[test]
    fn test_deposit_validation_leaves_position_untouched() {
        let registry = registry();
        let mut position = UserPosition::default();

        assert!(matches!(
            position.record_deposit(&registry, WETH, U256::ZERO),
            Err(EngineError::MustBeMoreThanZero)
        ));
        assert!(matches!(
            position.record_deposit(&registry, WBTC, U256::from(1u64)),
            Err(EngineError::NotAllowedCollateral { .. })
        ));
        assert!(position.is_empty());
    }

    #[test]
    fn test_withdraw_requires_balance() {
        let registry = registry();
        let mut position = UserPosition::default();
        position.record_deposit(&registry, WETH, U256::from(10u64)).unwrap();

        assert!(matches!(
            position.record_withdrawal(WETH, U256::from(11u64)),
            Err(EngineError::InsufficientCollateral { .. })
        ));
        assert_eq!(position.collateral_of(&WETH), U256::from(10u64));

        position.record_withdrawal(WETH, U256::from(10u64)).unwrap();
        assert!(position.is_empty());
    }
}
