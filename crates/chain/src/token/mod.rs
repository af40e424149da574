//! Fungible token interfaces.
//!
//! Calls take the acting account explicitly (`caller`), standing in for
//! `msg.sender` on a real ERC20 contract.

mod erc20;

pub use erc20::Erc20Ledger;

use alloy::primitives::{Address, U256};
use std::fmt::Debug;
use thiserror::Error;

/// Token call failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("insufficient balance for {account}: have {balance}, need {needed}")]
    InsufficientBalance {
        account: Address,
        balance: U256,
        needed: U256,
    },

    #[error("insufficient allowance from {owner} to {spender}: have {allowance}, need {needed}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowance: U256,
        needed: U256,
    },

    #[error("{caller} is not the token owner")]
    NotOwner { caller: Address },

    #[error("zero address not allowed")]
    ZeroAddress,

    #[error("amount must be more than zero")]
    ZeroAmount,

    #[error("token supply overflow")]
    Overflow,
}

/// ERC20-style transfer surface used for collateral assets.
pub trait FungibleToken: Send + Sync + Debug {
    /// Token contract address.
    fn address(&self) -> Address;

    /// Token decimals.
    fn decimals(&self) -> u8;

    /// Balance held by `account`.
    fn balance_of(&self, account: Address) -> U256;

    /// Amount `spender` may move on behalf of `owner`.
    fn allowance(&self, owner: Address, spender: Address) -> U256;

    /// Let `spender` move up to `amount` of the caller's balance.
    fn approve(&self, caller: Address, spender: Address, amount: U256) -> Result<(), TokenError>;

    /// Move `amount` from the caller to `to`.
    fn transfer(&self, caller: Address, to: Address, amount: U256) -> Result<(), TokenError>;

    /// Move `amount` from `from` to `to` using the caller's allowance.
    fn transfer_from(
        &self,
        caller: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), TokenError>;
}

/// Token whose supply is controlled by a single owner (the engine).
pub trait MintableToken: FungibleToken {
    /// Create `amount` new tokens for `to`. Owner only.
    fn mint(&self, caller: Address, to: Address, amount: U256) -> Result<(), TokenError>;

    /// Destroy `amount` of the caller's own balance. Owner only.
    fn burn(&self, caller: Address, amount: U256) -> Result<(), TokenError>;

    /// Current owner.
    fn owner(&self) -> Address;
}
