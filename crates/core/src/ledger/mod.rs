//! Position ledgers.
//!
//! A [`UserPosition`] holds one user's collateral per token and minted debt.
//! The [`PositionStore`] owns every position and is the only persisted state
//! besides the registry. Ledger operations work on a position value so the
//! engine can stage a change, validate it and only then write it back.

mod collateral;
mod debt;

use alloy::primitives::{Address, U256};
use std::collections::HashMap;

/// Per-user collateral balances and minted debt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPosition {
    /// Deposited amount per collateral token (token decimals)
    collateral: HashMap<Address, U256>,
    /// Minted debt (18 decimals)
    debt_minted: U256,
}

impl UserPosition {
    /// Minted debt.
    pub fn debt(&self) -> U256 {
        self.debt_minted
    }

    /// Deposited amount of one collateral token.
    pub fn collateral_of(&self, token: &Address) -> U256 {
        self.collateral.get(token).copied().unwrap_or(U256::ZERO)
    }

    /// True when there is neither collateral nor debt.
    pub fn is_empty(&self) -> bool {
        self.debt_minted.is_zero() && self.collateral.values().all(|a| a.is_zero())
    }
}

/// Owned store of all user positions.
#[derive(Debug, Default)]
pub struct PositionStore {
    positions: HashMap<Address, UserPosition>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a user's position (empty if the user never deposited).
    pub fn position(&self, user: &Address) -> UserPosition {
        self.positions.get(user).cloned().unwrap_or_default()
    }

    /// Borrow a user's position if one exists.
    pub fn get(&self, user: &Address) -> Option<&UserPosition> {
        self.positions.get(user)
    }

    /// Write a position back, returning what it replaced.
    pub fn replace(&mut self, user: Address, position: UserPosition) -> UserPosition {
        self.positions.insert(user, position).unwrap_or_default()
    }

    /// Number of users with a recorded position.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
